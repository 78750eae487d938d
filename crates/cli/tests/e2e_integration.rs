//! End-to-end integration tests for Waypoint runs.
//!
//! These drive the full pipeline (LLM reasoner over a scripted provider,
//! built-in tools, gates, budgets, checkpoint stores) through `run_turn` and
//! `resume_turn`, including restarts between suspension and resume.

use std::sync::Arc;

use waypoint_agent::{DedupTracker, LlmReasoner, RunController, RunError, RunEvent, TurnOutcome};
use waypoint_checkpoint::{FileCheckpointStore, InMemoryCheckpointStore, SqliteCheckpointStore};
use waypoint_config::{AppConfig, HitlConfig};
use waypoint_core::error::ProviderError;
use waypoint_core::message::{Message, MessageToolCall};
use waypoint_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use waypoint_core::{
    ActionRequest, BudgetExceeded, Budgets, CheckpointStore, ConversationId, ConversationState, InterruptKind,
    ObservationStatus, ResumeValue, RunNode, signature_of,
};
use waypoint_tools::{MemoryStore, NavigationSession, registry_with};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A mock provider that returns scripted responses in sequence.
struct ScriptedProvider {
    responses: std::sync::Mutex<Vec<ProviderResponse>>,
    call_count: std::sync::Mutex<usize>,
}

impl ScriptedProvider {
    fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            call_count: std::sync::Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let responses = self.responses.lock().unwrap();
        if *count >= responses.len() {
            panic!(
                "ScriptedProvider exhausted: call #{}, have {}",
                *count,
                responses.len()
            );
        }
        let resp = responses[*count].clone();
        *count += 1;
        Ok(resp)
    }
}

fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

fn tool_response(id: &str, name: &str, args: serde_json::Value) -> ProviderResponse {
    let mut msg = Message::assistant("");
    msg.tool_calls = vec![MessageToolCall {
        id: id.to_string(),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }];
    ProviderResponse {
        message: msg,
        usage: None,
        model: "mock".into(),
        metadata: serde_json::Map::new(),
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Fixture {
    controller: RunController,
    provider: Arc<ScriptedProvider>,
    session: NavigationSession,
}

fn fixture(
    responses: Vec<ProviderResponse>,
    store: Arc<dyn CheckpointStore>,
    hitl: HitlConfig,
    budgets: Budgets,
) -> Fixture {
    let provider = Arc::new(ScriptedProvider::new(responses));
    let session = NavigationSession::new();
    let tools = Arc::new(registry_with(session.clone(), MemoryStore::new()));
    let reasoner = LlmReasoner::new(provider.clone(), "mock", tools.clone());
    let controller = RunController::new(Arc::new(reasoner), tools, store)
        .with_hitl(hitl)
        .with_budgets(budgets)
        .with_silent_tools(AppConfig::default().silent_tools);
    Fixture {
        controller,
        provider,
        session,
    }
}

fn memory_fixture(responses: Vec<ProviderResponse>) -> Fixture {
    fixture(
        responses,
        Arc::new(InMemoryCheckpointStore::new()),
        HitlConfig::default(),
        Budgets::default(),
    )
}

async fn load(controller: &RunController, id: &ConversationId) -> ConversationState {
    controller.conversation(id).await.unwrap().unwrap()
}

fn observations(state: &ConversationState) -> Vec<(String, ObservationStatus)> {
    state
        .history_observations()
        .map(|o| (o.tool_name.clone(), o.status))
        .collect()
}

// ── Scenario A: confirmation, then cancel ────────────────────────────────

#[tokio::test]
async fn e2e_confirmation_cancel_skips_the_tool() {
    let f = memory_fixture(vec![
        tool_response("call_1", "set_destination", serde_json::json!({"poi_name": "Central Park"})),
        text_response("Okay, I left the route unchanged."),
    ]);
    let id = ConversationId::from("scenario-a");

    let outcome = f.controller.run_turn(&id, "Take me to Central Park").await.unwrap();
    let request = outcome.interrupt().expect("should suspend");
    assert_eq!(request.kind, InterruptKind::Confirmation);
    assert_eq!(request.tool_name, "set_destination");
    assert!(request.message.contains("Central Park"));

    let outcome = f.controller.resume_turn(&id, ResumeValue::cancel()).await.unwrap();
    let reply = outcome.reply().expect("should complete");
    assert!(reply.message.contains("⊘ set_destination: cancelled"));
    assert_eq!(reply.total_tool_calls, 0);

    let state = load(&f.controller, &id).await;
    assert_eq!(
        observations(&state),
        vec![("set_destination".to_string(), ObservationStatus::Cancelled)]
    );
    assert!(f.session.snapshot().await.destination.is_none());
}

// ── Scenario B: ask_params, then confirmation ────────────────────────────

#[tokio::test]
async fn e2e_missing_date_is_asked_then_merged() {
    let f = memory_fixture(vec![
        tool_response("call_1", "book_ticket", serde_json::json!({"train_no": "G101"})),
        text_response("Your ticket is booked."),
    ]);
    let id = ConversationId::from("scenario-b");

    let outcome = f.controller.run_turn(&id, "Book train G101 for me").await.unwrap();
    let request = outcome.interrupt().unwrap();
    assert_eq!(request.kind, InterruptKind::AskParams);
    assert_eq!(request.missing_params(), ["date".to_string()]);

    let patch = ResumeValue::params(serde_json::json!({"date": "2025-05-01"}));
    let outcome = f.controller.resume_turn(&id, patch).await.unwrap();

    // book_ticket is also confirmation-gated; the prompt shows the merged args.
    let request = outcome.interrupt().unwrap();
    assert_eq!(request.kind, InterruptKind::Confirmation);
    assert_eq!(request.message, "Book train G101 on 2025-05-01?");

    let outcome = f.controller.resume_turn(&id, ResumeValue::confirm()).await.unwrap();
    let reply = outcome.reply().unwrap();
    assert!(reply.message.starts_with("Your ticket is booked."));
    assert_eq!(reply.total_tool_calls, 1);

    let state = load(&f.controller, &id).await;
    let obs = state.history_observations().last().unwrap();
    assert_eq!(obs.status, ObservationStatus::Success);
    let merged = serde_json::json!({"train_no": "G101", "date": "2025-05-01"});
    assert_eq!(obs.signature, signature_of("book_ticket", merged.as_object().unwrap()));
    assert!(obs.content_text().contains("\"status\":\"booked\""));
}

// ── Scenario C: selection over a 5-item search result ────────────────────

#[tokio::test]
async fn e2e_selection_records_only_the_chosen_candidate() {
    let mut hitl = HitlConfig::default();
    hitl.require_selection.push("search_poi".into());
    let f = fixture(
        vec![
            tool_response("call_1", "search_poi", serde_json::json!({"keyword": "charging"})),
            text_response("Got it."),
        ],
        Arc::new(InMemoryCheckpointStore::new()),
        hitl,
        Budgets::default(),
    );
    let id = ConversationId::from("scenario-c");

    let outcome = f.controller.run_turn(&id, "Find a charging station").await.unwrap();
    let request = outcome.interrupt().unwrap();
    assert_eq!(request.kind, InterruptKind::Selection);
    assert_eq!(request.candidates().len(), 5);
    assert_eq!(request.message, "I found 5 options. Which one would you like?");

    let third = request.candidates()[2].clone();
    assert_eq!(third.id, 3);
    assert_eq!(third.name, "charging Plaza");

    let chosen = serde_json::to_value(&third).unwrap();
    let outcome = f.controller.resume_turn(&id, ResumeValue::selected(chosen)).await.unwrap();
    assert!(outcome.reply().is_some());

    let state = load(&f.controller, &id).await;
    let obs = state.history_observations().last().unwrap();
    assert_eq!(obs.status, ObservationStatus::Success);
    assert_eq!(obs.payload.as_deref(), Some(serde_json::to_string(&third).unwrap().as_str()));
    assert!(!obs.content_text().contains("North Entrance"));
    assert_eq!(state.total_tool_calls, 1);
}

#[tokio::test]
async fn e2e_cancelled_selection_still_counts_the_call() {
    let f = memory_fixture(vec![
        tool_response(
            "call_1",
            "query_tickets",
            serde_json::json!({"from_station": "Beijing", "to_station": "Shanghai", "date": "2025-05-01"}),
        ),
        text_response("No problem."),
    ]);
    let id = ConversationId::from("selection-cancel");

    let outcome = f.controller.run_turn(&id, "Trains to Shanghai on May 1st").await.unwrap();
    assert_eq!(outcome.interrupt().unwrap().kind, InterruptKind::Selection);

    let outcome = f.controller.resume_turn(&id, ResumeValue::cancel()).await.unwrap();
    assert_eq!(outcome.reply().unwrap().total_tool_calls, 1);
    let state = load(&f.controller, &id).await;
    assert_eq!(
        observations(&state),
        vec![("query_tickets".to_string(), ObservationStatus::Cancelled)]
    );
}

// ── Scenario D: iteration budget ─────────────────────────────────────────

#[tokio::test]
async fn e2e_iteration_cap_stops_before_the_eleventh_call() {
    let responses = (1..=11)
        .map(|i| tool_response(&format!("call_{i}"), "get_weather", serde_json::json!({"city": format!("City {i}")})))
        .collect();
    let f = memory_fixture(responses);
    let id = ConversationId::from("scenario-d");

    let outcome = f.controller.run_turn(&id, "Weather everywhere").await.unwrap();
    let reply = outcome.reply().unwrap();

    assert_eq!(reply.stop_reason, Some(BudgetExceeded::Iterations { limit: 10 }));
    assert_eq!(
        reply.message,
        "Sorry, this request needed more than 10 reasoning steps, so I stopped here. Please simplify the request or ask again."
    );
    assert_eq!(reply.iteration_count, 10);
    assert_eq!(reply.total_tool_calls, 10);
    assert_eq!(f.provider.calls(), 10);

    let state = load(&f.controller, &id).await;
    assert!(state.force_terminate);
    assert_eq!(state.node, RunNode::Done);
}

// ── Scenario E: duplicate across iterations ──────────────────────────────

#[tokio::test]
async fn e2e_repeated_call_is_skipped() {
    let f = memory_fixture(vec![
        tool_response("call_1", "get_weather", serde_json::json!({"city": "Oslo"})),
        tool_response("call_2", "get_weather", serde_json::json!({"city": " Oslo "})),
        text_response("It's raining in Oslo."),
    ]);
    let id = ConversationId::from("scenario-e");

    let outcome = f.controller.run_turn(&id, "Weather in Oslo?").await.unwrap();
    let reply = outcome.reply().unwrap();
    assert_eq!(reply.total_tool_calls, 1);
    assert_eq!(reply.iteration_count, 2);
    assert_eq!(f.provider.calls(), 3);

    let state = load(&f.controller, &id).await;
    assert_eq!(
        observations(&state),
        vec![("get_weather".to_string(), ObservationStatus::Success)]
    );
}

// ── Properties ───────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_tool_call_budget_is_monotonic_and_sticky() {
    let responses = (1..=5)
        .map(|i| tool_response(&format!("call_{i}"), "get_weather", serde_json::json!({"city": format!("City {i}")})))
        .collect();
    let f = fixture(
        responses,
        Arc::new(InMemoryCheckpointStore::new()),
        HitlConfig::default(),
        Budgets::default().with_max_total_tool_calls(3),
    );
    let id = ConversationId::from("tool-cap");

    let first = f.controller.run_turn(&id, "Weather x5").await.unwrap();
    let reply = first.reply().unwrap();
    assert_eq!(reply.total_tool_calls, 3);
    assert_eq!(reply.stop_reason, Some(BudgetExceeded::ToolCalls { limit: 3 }));
    let calls_after_first = f.provider.calls();

    // The cap covers the whole conversation: the next turn stops before reasoning.
    let second = f.controller.run_turn(&id, "And once more?").await.unwrap();
    let reply = second.reply().unwrap();
    assert_eq!(reply.total_tool_calls, 3);
    assert_eq!(reply.stop_reason, Some(BudgetExceeded::ToolCalls { limit: 3 }));
    assert_eq!(f.provider.calls(), calls_after_first);
}

#[tokio::test]
async fn e2e_single_outstanding_interrupt() {
    let f = memory_fixture(vec![tool_response(
        "call_1",
        "set_destination",
        serde_json::json!({"poi_name": "Central Park"}),
    )]);
    let id = ConversationId::from("single-interrupt");
    f.controller.run_turn(&id, "Go to Central Park").await.unwrap();

    let err = f.controller.run_turn(&id, "Actually, never mind").await.unwrap_err();
    assert!(matches!(err, RunError::InterruptOutstanding(_)));

    let mut state = load(&f.controller, &id).await;
    let again = state.pending_interrupt.clone().unwrap();
    assert!(state.park_interrupt(again).is_err());
}

#[tokio::test]
async fn e2e_mismatched_resume_keeps_the_checkpoint() {
    let f = memory_fixture(vec![
        tool_response("call_1", "set_destination", serde_json::json!({"poi_name": "Central Park"})),
        text_response("Destination set."),
    ]);
    let id = ConversationId::from("mismatch");
    f.controller.run_turn(&id, "Go to Central Park").await.unwrap();
    let before = serde_json::to_value(load(&f.controller, &id).await).unwrap();

    let err = f
        .controller
        .resume_turn(&id, ResumeValue::params(serde_json::json!({"poi_name": "Times Square"})))
        .await
        .unwrap_err();
    assert!(matches!(err, RunError::ResumeMismatch(_)));
    assert_eq!(serde_json::to_value(load(&f.controller, &id).await).unwrap(), before);

    let outcome = f.controller.resume_turn(&id, ResumeValue::confirm()).await.unwrap();
    assert!(outcome.reply().is_some());
    assert_eq!(
        f.session.snapshot().await.destination.as_deref(),
        Some("Central Park")
    );
}

#[tokio::test]
async fn e2e_complete_decision_never_carries_actions() {
    let f = memory_fixture(vec![text_response(
        r#"{"is_complete": true, "actions": [{"tool": "stop_navigation", "args": {}}], "response": "All done."}"#,
    )]);
    let id = ConversationId::from("complete-shape");

    let outcome = f.controller.run_turn(&id, "Thanks").await.unwrap();
    let reply = outcome.reply().unwrap();
    assert_eq!(reply.message, "All done.");
    assert_eq!(reply.total_tool_calls, 0);

    let state = load(&f.controller, &id).await;
    let decision = state.decision.unwrap();
    assert!(decision.is_complete());
    assert!(decision.actions().is_empty());
}

#[tokio::test]
async fn e2e_stream_ends_at_interrupt() {
    let f = memory_fixture(vec![tool_response(
        "call_1",
        "set_destination",
        serde_json::json!({"poi_name": "Central Park"}),
    )]);
    let controller = Arc::new(f.controller);
    let mut rx = controller
        .clone()
        .run_turn_stream(ConversationId::from("stream"), "Go to Central Park".into());

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], RunEvent::Thought { .. }));
    match &events[1] {
        RunEvent::Interrupt { interrupt } => assert_eq!(interrupt.kind, InterruptKind::Confirmation),
        other => panic!("expected interrupt, got {other:?}"),
    }
}

// ── Restart between suspension and resume ────────────────────────────────

#[tokio::test]
async fn e2e_resume_after_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let id = ConversationId::from("restart-file");

    {
        let first = fixture(
            vec![
                tool_response("call_1", "get_weather", serde_json::json!({"city": "Oslo"})),
                tool_response("call_2", "set_destination", serde_json::json!({"poi_name": "Oslo S"})),
            ],
            Arc::new(FileCheckpointStore::new(dir.path())),
            HitlConfig::default(),
            Budgets::default(),
        );
        let outcome = first.controller.run_turn(&id, "Weather in Oslo, then drive to Oslo S").await.unwrap();
        assert_eq!(outcome.interrupt().unwrap().kind, InterruptKind::Confirmation);
    }

    // A fresh process: new controller, new provider, same directory.
    let second = fixture(
        vec![
            // The model repeats the finished weather call; it must not run again.
            tool_response("call_3", "get_weather", serde_json::json!({"city": "Oslo"})),
            text_response("Heading to Oslo S."),
        ],
        Arc::new(FileCheckpointStore::new(dir.path())),
        HitlConfig::default(),
        Budgets::default(),
    );

    let state = load(&second.controller, &id).await;
    assert_eq!(state.node, RunNode::Suspended);
    let replay = ActionRequest::new("replay", "get_weather", serde_json::json!({"city": "Oslo"}));
    assert!(DedupTracker::new().is_duplicate(&state, &replay));

    let outcome = second.controller.resume_turn(&id, ResumeValue::confirm()).await.unwrap();
    let reply = outcome.reply().unwrap();
    assert!(reply.message.starts_with("Heading to Oslo S."));
    assert_eq!(reply.total_tool_calls, 2);
    assert_eq!(second.session.snapshot().await.destination.as_deref(), Some("Oslo S"));

    let state = load(&second.controller, &id).await;
    assert_eq!(
        observations(&state),
        vec![
            ("get_weather".to_string(), ObservationStatus::Success),
            ("set_destination".to_string(), ObservationStatus::Success),
        ]
    );
}

#[tokio::test]
async fn e2e_resume_after_restart_with_sqlite_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");
    let id = ConversationId::from("restart-sqlite");

    {
        let store = SqliteCheckpointStore::new(&path).await.unwrap();
        let first = fixture(
            vec![tool_response("call_1", "book_ticket", serde_json::json!({"train_no": "G101"}))],
            Arc::new(store),
            HitlConfig::default(),
            Budgets::default(),
        );
        let outcome = first.controller.run_turn(&id, "Book G101").await.unwrap();
        assert_eq!(outcome.interrupt().unwrap().kind, InterruptKind::AskParams);
    }

    let store = SqliteCheckpointStore::new(&path).await.unwrap();
    let second = fixture(
        vec![text_response("Booked.")],
        Arc::new(store),
        HitlConfig::default(),
        Budgets::default(),
    );

    let outcome = second
        .controller
        .resume_turn(&id, ResumeValue::params(serde_json::json!({"date": "2025-05-01"})))
        .await
        .unwrap();
    assert_eq!(outcome.interrupt().unwrap().kind, InterruptKind::Confirmation);

    let outcome = second.controller.resume_turn(&id, ResumeValue::confirm()).await.unwrap();
    match outcome {
        TurnOutcome::Completed(reply) => {
            assert!(reply.message.starts_with("Booked."));
            assert_eq!(reply.total_tool_calls, 1);
        }
        TurnOutcome::Interrupted(request) => panic!("unexpected interrupt {request:?}"),
    }

    let summaries = second.controller.conversations().await.unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].node, RunNode::Done);
    assert!(summaries[0].pending_interrupt.is_none());
}

//! Run controller: the resumable state machine behind `run_turn` and
//! `resume_turn`.
//!
//! ```text
//! REASONING ──(no actions / budget stop)──────────────▶ DONE
//! REASONING ──(actions)──▶ EXECUTING
//! EXECUTING ──(actions of the decision remain)──▶ EXECUTING
//! EXECUTING ──(decision exhausted)──▶ REASONING
//! EXECUTING ──(interrupt raised)──▶ SUSPENDED ──(resume)──▶ EXECUTING
//! EXECUTING ──(budget denied)──▶ DONE
//! ```
//!
//! The state is checkpointed after every transition. A suspended run holds
//! no memory: `resume_turn` reloads the checkpoint, possibly in another
//! process, and carries on from the parked action. Calls for one
//! conversation are serialized with a per-conversation async lock; different
//! conversations never contend. A lock entry lives only while some call
//! holds or waits on it.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};
use waypoint_config::HitlConfig;
use waypoint_core::{
    BudgetExceeded, Budgets, CheckpointError, CheckpointStore, CheckpointSummary, ConversationId,
    ConversationState, DomainEvent, EventBus, InterruptOutstanding, InterruptRequest, Message,
    PendingInterrupt, ResumeValue, RunNode, ToolRegistry,
};
use waypoint_telemetry::{BudgetGuard, IterationCheck, Span, SpanKind, TelemetryEngine};

use crate::classifier::{Classifier, KeywordClassifier};
use crate::executor::{Executor, StepOutcome};
use crate::interrupt::{InterruptController, ResumeMismatch, ResumeOutcome};
use crate::reasoner::Reasoner;
use crate::responder::Responder;
use crate::stream_event::RunEvent;

// ── Errors and outcomes ───────────────────────────────────────────────────

/// Errors surfaced to callers of the run controller.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    InterruptOutstanding(#[from] InterruptOutstanding),

    #[error("conversation {0} has no pending interrupt")]
    NoPendingInterrupt(String),

    #[error(transparent)]
    ResumeMismatch(#[from] ResumeMismatch),

    #[error("conversation {0} not found")]
    ConversationNotFound(String),

    #[error("checkpoint failure: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// The final message of a completed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnReply {
    pub conversation_id: String,
    pub message: String,
    /// Heuristic hint that the message asks the user something
    pub expects_reply: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<BudgetExceeded>,
    pub iteration_count: u32,
    pub total_tool_calls: u32,
}

/// How a `run_turn` / `resume_turn` call ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Completed(TurnReply),
    Interrupted(InterruptRequest),
}

impl TurnOutcome {
    pub fn reply(&self) -> Option<&TurnReply> {
        match self {
            Self::Completed(reply) => Some(reply),
            Self::Interrupted(_) => None,
        }
    }

    pub fn interrupt(&self) -> Option<&InterruptRequest> {
        match self {
            Self::Interrupted(request) => Some(request),
            Self::Completed(_) => None,
        }
    }
}

type EventSink<'a> = Option<&'a mpsc::Sender<RunEvent>>;

async fn emit(sink: EventSink<'_>, event: RunEvent) {
    if let Some(tx) = sink {
        // A dropped receiver only means nobody is listening any more.
        let _ = tx.send(event).await;
    }
}

// ── Per-conversation locks ────────────────────────────────────────────────

#[derive(Default)]
struct TurnLocks {
    entries: std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TurnLocks {
    async fn acquire(&self, id: &ConversationId) -> TurnLock<'_> {
        let handle = self.entries().entry(id.to_string()).or_default().clone();
        let guard = handle.clone().lock_owned().await;
        TurnLock {
            locks: self,
            id: id.to_string(),
            handle,
            guard: Some(guard),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Mutex<()>>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries().len()
    }
}

/// Held for the duration of one call on a conversation.
struct TurnLock<'a> {
    locks: &'a TurnLocks,
    id: String,
    handle: Arc<Mutex<()>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for TurnLock<'_> {
    fn drop(&mut self) {
        let mut entries = self.locks.entries();
        self.guard.take();
        // Only the map and this handle left: nobody is waiting.
        if Arc::strong_count(&self.handle) == 2 {
            entries.remove(&self.id);
        }
        // Entries left behind by acquires cancelled while waiting.
        entries.retain(|_, lock| Arc::strong_count(lock) > 1);
    }
}

// ── Controller ────────────────────────────────────────────────────────────

pub struct RunController {
    reasoner: Arc<dyn Reasoner>,
    tools: Arc<ToolRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    guard: BudgetGuard,
    interrupts: Arc<InterruptController>,
    responder: Responder,
    classifier: Arc<dyn Classifier>,
    reset_iterations: bool,
    event_bus: Option<Arc<EventBus>>,
    telemetry: Option<Arc<TelemetryEngine>>,
    locks: TurnLocks,
}

impl RunController {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        tools: Arc<ToolRegistry>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            reasoner,
            tools,
            checkpoints,
            guard: BudgetGuard::new(Budgets::default()),
            interrupts: Arc::new(InterruptController::new(HitlConfig::default())),
            responder: Responder::default(),
            classifier: Arc::new(KeywordClassifier),
            reset_iterations: true,
            event_bus: None,
            telemetry: None,
            locks: TurnLocks::default(),
        }
    }

    pub fn with_budgets(mut self, budgets: Budgets) -> Self {
        self.guard = BudgetGuard::new(budgets);
        self
    }

    pub fn with_hitl(mut self, hitl: HitlConfig) -> Self {
        self.interrupts = Arc::new(InterruptController::new(hitl));
        self
    }

    pub fn with_silent_tools<I, S>(mut self, silent_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.responder = Responder::new(silent_tools);
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Whether a new user turn resets `iteration_count` (default) or carries it.
    pub fn with_reset_iterations(mut self, reset: bool) -> Self {
        self.reset_iterations = reset;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<TelemetryEngine>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn budgets(&self) -> &Budgets {
        self.guard.budgets()
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    pub fn telemetry(&self) -> Option<&Arc<TelemetryEngine>> {
        self.telemetry.as_ref()
    }

    // ── Entry points ──────────────────────────────────────────────────

    /// Start a new user turn and drive it until it completes or suspends.
    pub async fn run_turn(&self, id: &ConversationId, message: &str) -> Result<TurnOutcome, RunError> {
        self.run_turn_inner(id, message, None).await
    }

    /// Answer the pending interrupt and drive the turn on from there.
    ///
    /// A value of the wrong shape is rejected before anything is touched, so
    /// the checkpoint still holds the same interrupt afterwards.
    pub async fn resume_turn(&self, id: &ConversationId, value: ResumeValue) -> Result<TurnOutcome, RunError> {
        self.resume_turn_inner(id, value, None).await
    }

    /// Streaming variant of [`run_turn`](Self::run_turn).
    ///
    /// The receiver yields events as the turn progresses and ends after an
    /// `interrupt`, `done` or `error` event.
    pub fn run_turn_stream(self: Arc<Self>, id: ConversationId, message: String) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            if let Err(e) = self.run_turn_inner(&id, &message, Some(&tx)).await {
                let _ = tx.send(RunEvent::Error { message: e.to_string() }).await;
            }
        });
        rx
    }

    /// Streaming variant of [`resume_turn`](Self::resume_turn).
    pub fn resume_turn_stream(self: Arc<Self>, id: ConversationId, value: ResumeValue) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(128);
        tokio::spawn(async move {
            if let Err(e) = self.resume_turn_inner(&id, value, Some(&tx)).await {
                let _ = tx.send(RunEvent::Error { message: e.to_string() }).await;
            }
        });
        rx
    }

    // ── Inspection ────────────────────────────────────────────────────

    pub async fn conversation(&self, id: &ConversationId) -> Result<Option<ConversationState>, RunError> {
        Ok(self.checkpoints.load(id).await?)
    }

    pub async fn conversations(&self) -> Result<Vec<CheckpointSummary>, RunError> {
        Ok(self.checkpoints.list().await?)
    }

    /// Drop a conversation's checkpoint. Returns whether one existed.
    pub async fn delete(&self, id: &ConversationId) -> Result<bool, RunError> {
        let _turn = self.locks.acquire(id).await;
        Ok(self.checkpoints.delete(id).await?)
    }

    // ── Turn lifecycle ────────────────────────────────────────────────

    async fn run_turn_inner(
        &self,
        id: &ConversationId,
        message: &str,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, RunError> {
        let _turn = self.locks.acquire(id).await;

        let mut state = self
            .checkpoints
            .load(id)
            .await?
            .unwrap_or_else(|| ConversationState::new(id.clone()));

        if let Some(pending) = &state.pending_interrupt {
            return Err(InterruptOutstanding {
                kind: pending.request.kind.to_string(),
                call_id: pending.request.call_id.clone(),
            }
            .into());
        }

        state.begin_turn(message, self.reset_iterations);
        self.save(&state).await?;

        tracing::info!(conversation_id = %id, turn = state.turns, "Turn started");
        self.publish(DomainEvent::TurnStarted {
            conversation_id: id.to_string(),
            turn: state.turns,
            timestamp: Utc::now(),
        });

        let trace = self.start_trace(id);
        let result = self.drive(&mut state, trace.as_deref(), sink).await;
        self.end_trace_on_error(trace.as_deref(), &result);
        result
    }

    async fn resume_turn_inner(
        &self,
        id: &ConversationId,
        value: ResumeValue,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, RunError> {
        let _turn = self.locks.acquire(id).await;

        let mut state = self
            .checkpoints
            .load(id)
            .await?
            .ok_or_else(|| RunError::ConversationNotFound(id.to_string()))?;

        let pending = state
            .pending_interrupt
            .clone()
            .ok_or_else(|| RunError::NoPendingInterrupt(id.to_string()))?;

        let outcome = self.interrupts.apply_resume(&pending, value)?;
        let cancelled = outcome == ResumeOutcome::Cancelled;
        let kind = pending.request.kind;

        state.take_interrupt();
        state.node = RunNode::Executing;
        state.clock.resume();

        tracing::info!(conversation_id = %id, kind = %kind, cancelled, "Interrupt resolved");
        self.publish(DomainEvent::InterruptResolved {
            conversation_id: id.to_string(),
            kind,
            cancelled,
            timestamp: Utc::now(),
        });

        let trace = self.start_trace(id);
        let result = self
            .continue_resumed(&mut state, pending, outcome, trace.as_deref(), sink)
            .await;
        self.end_trace_on_error(trace.as_deref(), &result);
        result
    }

    /// Finish the parked action, then drive on.
    async fn continue_resumed(
        &self,
        state: &mut ConversationState,
        pending: PendingInterrupt,
        outcome: ResumeOutcome,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, RunError> {
        let step = self.executor().resume(state, pending, outcome).await?;
        if let Some(suspended) = self.apply_step(state, step, trace, sink).await? {
            return Ok(suspended);
        }
        self.save(state).await?;
        self.drive(state, trace, sink).await
    }

    /// Run the state machine from `state.node` until the turn completes or
    /// suspends.
    async fn drive(
        &self,
        state: &mut ConversationState,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, RunError> {
        let executor = self.executor();
        loop {
            match state.node {
                RunNode::Reasoning => self.reason(state, trace, sink).await?,
                RunNode::Executing => {
                    let step = executor.step(state).await?;
                    if let Some(suspended) = self.apply_step(state, step, trace, sink).await? {
                        return Ok(suspended);
                    }
                }
                RunNode::Done => return self.finish(state, trace, sink).await,
                RunNode::Suspended => match &state.pending_interrupt {
                    Some(pending) => return Ok(TurnOutcome::Interrupted(pending.request.clone())),
                    None => state.node = RunNode::Reasoning,
                },
            }
            self.save(state).await?;
        }
    }

    /// REASONING: budget check, then one reasoner call.
    async fn reason(
        &self,
        state: &mut ConversationState,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) -> Result<(), RunError> {
        if let IterationCheck::Stop(reason) = self.guard.check_before_iteration(state) {
            self.stop(state, reason, trace, sink).await;
            return Ok(());
        }

        let remaining = self.guard.remaining_time(state);
        let mut span = Span::new(SpanKind::Reasoning, self.reasoner.name())
            .with_meta("iteration", state.iteration_count + 1);

        let decision = match tokio::time::timeout(remaining, self.reasoner.decide(state)).await {
            Ok(decision) => decision,
            Err(_) => {
                span.end(false);
                self.record_span(trace, span);
                let reason = BudgetExceeded::WallClock {
                    limit_secs: self.guard.budgets().wall_clock_timeout.as_secs(),
                };
                self.stop(state, reason, trace, sink).await;
                return Ok(());
            }
        };

        span.end(true);
        self.record_span(trace, span.with_meta("actions", decision.actions().len()));

        let iteration = if decision.is_complete() {
            state.iteration_count
        } else {
            state.iteration_count + 1
        };
        tracing::debug!(
            conversation_id = %state.conversation_id,
            iteration,
            actions = decision.actions().len(),
            "Reasoner decided"
        );
        emit(
            sink,
            RunEvent::Thought {
                iteration,
                rationale: decision.rationale().to_string(),
                actions: decision.actions().to_vec(),
            },
        )
        .await;

        if decision.is_complete() {
            // Observations of the last pass stay for the responder summary.
            state.decision = Some(decision);
            state.node = RunNode::Done;
        } else {
            state.iteration_count = iteration;
            state.push(Message::assistant_with_actions(
                decision.draft_response(),
                decision.actions(),
            ));
            state.install_decision(decision);
            state.node = RunNode::Executing;
        }
        Ok(())
    }

    /// Fold one executor step into the state machine. Returns the outcome
    /// to hand back when the step suspended the run.
    async fn apply_step(
        &self,
        state: &mut ConversationState,
        step: StepOutcome,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) -> Result<Option<TurnOutcome>, RunError> {
        let id = state.conversation_id.to_string();
        match step {
            StepOutcome::Suspended(request) => {
                state.node = RunNode::Suspended;
                state.clock.pause();
                self.save(state).await?;

                tracing::info!(
                    conversation_id = %id,
                    kind = %request.kind,
                    tool = %request.tool_name,
                    call_id = %request.call_id,
                    "Run suspended for human input"
                );
                self.publish(DomainEvent::InterruptRaised {
                    conversation_id: id,
                    kind: request.kind,
                    tool_name: request.tool_name.clone(),
                    timestamp: Utc::now(),
                });
                self.record_span(
                    trace,
                    Span::new(SpanKind::Interrupt, request.kind.as_str())
                        .with_meta("tool", request.tool_name.as_str())
                        .with_meta("call_id", request.call_id.as_str()),
                );
                self.end_trace(trace, "suspended");
                emit(
                    sink,
                    RunEvent::Interrupt {
                        interrupt: request.clone(),
                    },
                )
                .await;
                return Ok(Some(TurnOutcome::Interrupted(request)));
            }
            StepOutcome::Denied(reason) => {
                self.stop(state, reason, trace, sink).await;
                return Ok(None);
            }
            StepOutcome::Observed {
                observation,
                duration,
            } => {
                let duration_ms = duration.as_millis() as u64;
                self.publish(DomainEvent::ToolExecuted {
                    conversation_id: id,
                    tool_name: observation.tool_name.clone(),
                    status: observation.status,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                let mut span = Span::new(SpanKind::ToolExecution, observation.tool_name.as_str())
                    .with_meta("call_id", observation.call_id.as_str())
                    .with_meta("status", observation.status.as_str());
                span.end(observation.is_success());
                span.duration_ms = Some(duration_ms);
                self.record_span(trace, span);
                emit(
                    sink,
                    RunEvent::ToolResult {
                        call_id: observation.call_id.clone(),
                        tool_name: observation.tool_name.clone(),
                        status: observation.status,
                        content: observation.content_text(),
                    },
                )
                .await;
            }
            StepOutcome::Skipped { call_id, tool_name } => {
                self.publish(DomainEvent::DuplicateSkipped {
                    conversation_id: id,
                    tool_name: tool_name.clone(),
                    timestamp: Utc::now(),
                });
                emit(sink, RunEvent::ActionSkipped { call_id, tool_name }).await;
            }
            StepOutcome::Idle => {}
        }

        state.node = if state.has_pending_actions() {
            RunNode::Executing
        } else {
            RunNode::Reasoning
        };
        Ok(None)
    }

    /// A budget ends the turn: mark it and go to DONE.
    async fn stop(
        &self,
        state: &mut ConversationState,
        reason: BudgetExceeded,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) {
        tracing::warn!(
            conversation_id = %state.conversation_id,
            budget = reason.as_str(),
            iteration_count = state.iteration_count,
            total_tool_calls = state.total_tool_calls,
            "Budget exhausted; ending turn"
        );
        state.force_terminate = true;
        state.stop_reason = Some(reason);
        state.node = RunNode::Done;

        self.publish(DomainEvent::BudgetExhausted {
            conversation_id: state.conversation_id.to_string(),
            reason,
            timestamp: Utc::now(),
        });
        self.record_span(trace, Span::new(SpanKind::BudgetStop, reason.as_str()));
        emit(sink, RunEvent::BudgetExceeded { reason }).await;
    }

    /// DONE: compose, record and persist the final message.
    async fn finish(
        &self,
        state: &mut ConversationState,
        trace: Option<&str>,
        sink: EventSink<'_>,
    ) -> Result<TurnOutcome, RunError> {
        let message = self.responder.compose(state);
        state.push(Message::assistant(message.clone()));
        state.clock.pause();
        self.save(state).await?;

        let reply = TurnReply {
            conversation_id: state.conversation_id.to_string(),
            expects_reply: state.stop_reason.is_none() && self.classifier.expects_reply(&message),
            message,
            stop_reason: state.stop_reason,
            iteration_count: state.iteration_count,
            total_tool_calls: state.total_tool_calls,
        };

        tracing::info!(
            conversation_id = %reply.conversation_id,
            iteration_count = reply.iteration_count,
            total_tool_calls = reply.total_tool_calls,
            "Turn completed"
        );
        self.publish(DomainEvent::TurnCompleted {
            conversation_id: reply.conversation_id.clone(),
            iteration_count: reply.iteration_count,
            total_tool_calls: reply.total_tool_calls,
            timestamp: Utc::now(),
        });
        self.end_trace(trace, "completed");
        emit(
            sink,
            RunEvent::Done {
                conversation_id: reply.conversation_id.clone(),
                message: reply.message.clone(),
                expects_reply: reply.expects_reply,
                iteration_count: reply.iteration_count,
                total_tool_calls: reply.total_tool_calls,
            },
        )
        .await;
        Ok(TurnOutcome::Completed(reply))
    }

    // ── Plumbing ──────────────────────────────────────────────────────

    fn executor(&self) -> Executor {
        Executor::new(self.tools.clone(), self.interrupts.clone(), self.guard)
    }

    async fn save(&self, state: &ConversationState) -> Result<(), RunError> {
        self.checkpoints.save(state).await.map_err(|e| {
            tracing::warn!(
                conversation_id = %state.conversation_id,
                store = self.checkpoints.name(),
                error = %e,
                "Checkpoint write failed"
            );
            RunError::Checkpoint(e)
        })?;
        tracing::debug!(
            conversation_id = %state.conversation_id,
            node = state.node.as_str(),
            cursor = state.cursor,
            "Checkpoint saved"
        );
        Ok(())
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    fn start_trace(&self, id: &ConversationId) -> Option<String> {
        self.telemetry.as_ref().map(|t| t.start_trace(id.as_str()))
    }

    fn record_span(&self, trace: Option<&str>, span: Span) {
        if let (Some(telemetry), Some(trace_id)) = (&self.telemetry, trace) {
            telemetry.record_span(trace_id, span);
        }
    }

    fn end_trace(&self, trace: Option<&str>, outcome: &str) {
        if let (Some(telemetry), Some(trace_id)) = (&self.telemetry, trace) {
            telemetry.end_trace(trace_id, outcome);
        }
    }

    /// Successful paths end their own trace; a failed turn ends it here.
    fn end_trace_on_error(&self, trace: Option<&str>, result: &Result<TurnOutcome, RunError>) {
        if let Err(e) = result {
            tracing::warn!(error = %e, "Turn failed");
            self.end_trace(trace, "error");
        }
    }
}

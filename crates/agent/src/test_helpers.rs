//! Shared test helpers: scripted reasoning, scripted providers and tools
//! that record their invocations.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use waypoint_core::error::{ProviderError, ToolError};
use waypoint_core::message::{Message, MessageToolCall};
use waypoint_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use waypoint_core::{ConversationState, Decision, Tool, ToolRegistry, ToolResult};

use crate::reasoner::Reasoner;

// ── Providers ─────────────────────────────────────────────────────────────

/// A mock provider that returns a sequence of scripted responses.
///
/// Each call to `complete` returns the next response in the queue and
/// records the request. Panics if more calls are made than responses
/// provided.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose only call fails with `error`.
    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            requests: Mutex::new(Vec::new()),
        }
    }

    #[allow(dead_code)]
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("SequentialMockProvider: no response for call #{call}"))
    }
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response carrying tool calls `(id, name, args)`.
pub fn make_tool_call_response(calls: Vec<(&str, &str, serde_json::Value)>, text: &str) -> ProviderResponse {
    let mut message = Message::assistant(text);
    message.tool_calls = calls
        .into_iter()
        .map(|(id, name, args)| MessageToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args.to_string(),
        })
        .collect();
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

// ── Reasoner ──────────────────────────────────────────────────────────────

/// A reasoner that replays a fixed list of decisions, then completes with
/// "done" forever.
pub struct ScriptedReasoner {
    decisions: Mutex<VecDeque<Decision>>,
    calls: Mutex<usize>,
}

impl ScriptedReasoner {
    pub fn new(decisions: Vec<Decision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn decide(&self, _state: &ConversationState) -> Decision {
        *self.calls.lock().unwrap() += 1;
        self.decisions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Decision::complete("script exhausted", "done"))
    }
}

// ── Tools ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Echo,
    Fail(String),
    Json(serde_json::Value),
}

/// A tool that records every invocation. Clones share the record.
#[derive(Clone)]
pub struct RecordingTool {
    name: String,
    reply: Reply,
    delay: Option<Duration>,
    invocations: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl RecordingTool {
    /// Succeeds with `"<name> ok: <args>"`.
    pub fn new(name: &str) -> Self {
        Self::with_reply(name, Reply::Echo)
    }

    /// Returns `success = false` with `message`.
    pub fn failing(name: &str, message: &str) -> Self {
        Self::with_reply(name, Reply::Fail(message.into()))
    }

    /// Succeeds with `data` as structured output.
    #[allow(dead_code)]
    pub fn returning(name: &str, data: serde_json::Value) -> Self {
        Self::with_reply(name, Reply::Json(data))
    }

    fn with_reply(name: &str, reply: Reply) -> Self {
        Self {
            name: name.into(),
            reply,
            delay: None,
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep for `delay` before recording and replying.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_args(&self) -> Option<serde_json::Value> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Tool for RecordingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Records its invocations"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.invocations.lock().unwrap().push(arguments.clone());
        Ok(match &self.reply {
            Reply::Echo => ToolResult::ok(format!("{} ok: {arguments}", self.name)),
            Reply::Fail(message) => ToolResult::failed(message.clone()),
            Reply::Json(data) => ToolResult::json(data.clone()),
        })
    }
}

/// A registry holding exactly `tools`.
pub fn registry_with(tools: Vec<RecordingTool>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        registry.register(Box::new(tool));
    }
    Arc::new(registry)
}

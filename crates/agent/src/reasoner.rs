//! Reasoner: conversation state in, [`Decision`] out.
//!
//! The reasoner reads the state and never mutates it; counters belong to the
//! run controller. It never fails either: a backend error becomes a complete
//! decision carrying an apology, and an unreadable answer becomes the
//! documented fallback decision.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use waypoint_core::{
    ConversationState, Decision, Message, Provider, ProviderRequest, Role, ToolRegistry,
};

use crate::decision::{REASONER_FAILURE_MESSAGE, fallback_decision, parse_decision};

/// Produces the next decision for a conversation.
#[async_trait]
pub trait Reasoner: Send + Sync {
    fn name(&self) -> &str;

    async fn decide(&self, state: &ConversationState) -> Decision;
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are Waypoint, an in-car assistant for navigation, train \
tickets, weather and personal preferences. Use the provided tools when they help. Call each tool at \
most once with the same arguments; earlier results stay valid. When the request is handled, answer \
the user briefly without calling any tool.";

/// A reasoner backed by an LLM provider with native tool calling.
pub struct LlmReasoner {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
}

impl LlmReasoner {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.3,
            max_tokens: None,
            tools,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// System prompt plus the iteration number and the observations of the
    /// last execution pass, surfaced explicitly.
    fn system_message(&self, state: &ConversationState) -> Message {
        let mut prompt = self.system_prompt.clone();
        prompt.push_str(&format!(
            "\n\nReasoning iteration: {}.",
            state.iteration_count + 1
        ));

        if !state.observations.is_empty() {
            prompt.push_str("\nLatest tool observations:");
            for obs in &state.observations {
                prompt.push_str(&format!(
                    "\n- {} [{}]: {}",
                    obs.tool_name,
                    obs.status.as_str(),
                    obs.content_text()
                ));
            }
        }
        Message::system(prompt)
    }

    fn build_request(&self, state: &ConversationState) -> ProviderRequest {
        let mut messages = vec![self.system_message(state)];
        messages.extend(wire_history(&state.messages));
        ProviderRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: self.tools.definitions(),
            stop: vec![],
        }
    }
}

/// History as the provider should see it.
///
/// Tool calls that never got a result (skipped duplicates, calls stopped by
/// a budget) are dropped from their assistant message, and assistant
/// messages left with neither text nor calls are dropped entirely. Chat
/// APIs reject a tool call that has no matching tool message.
pub fn wire_history(messages: &[Message]) -> Vec<Message> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();

    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .filter_map(|m| {
            if m.role != Role::Assistant || m.tool_calls.is_empty() {
                return Some(m.clone());
            }
            let mut msg = m.clone();
            msg.tool_calls.retain(|call| answered.contains(call.id.as_str()));
            (!msg.tool_calls.is_empty() || !msg.content.trim().is_empty()).then_some(msg)
        })
        .collect()
}

#[async_trait]
impl Reasoner for LlmReasoner {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn decide(&self, state: &ConversationState) -> Decision {
        let iteration = state.iteration_count + 1;
        let request = self.build_request(state);

        let response = match self.provider.complete(request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %state.conversation_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Reasoner backend failed; ending turn"
                );
                return Decision::complete(format!("backend failure: {e}"), REASONER_FAILURE_MESSAGE);
            }
        };

        match parse_decision(&response.message, iteration) {
            Ok(decision) => {
                tracing::debug!(
                    conversation_id = %state.conversation_id,
                    iteration,
                    actions = decision.actions().len(),
                    complete = decision.is_complete(),
                    "Decision parsed"
                );
                decision
            }
            Err(failure) => {
                tracing::warn!(
                    conversation_id = %state.conversation_id,
                    iteration,
                    error = %failure,
                    "Malformed decision; using fallback"
                );
                fallback_decision(&failure)
            }
        }
    }
}

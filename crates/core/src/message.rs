//! Message domain types.
//!
//! A conversation's history is an append-only list of these messages:
//! user turns, assistant replies (possibly carrying tool calls), and tool
//! results that carry the [`Observation`] they recorded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::{ActionRequest, Observation};

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The assistant
    Assistant,
    /// System instructions (only ever sent to a provider, never stored)
    System,
    /// Tool execution result
    Tool,
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Tool calls requested by the assistant (if any)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<MessageToolCall>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// If this is a tool result, the observation it recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<Observation>,

    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            observation: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    /// Create an assistant message announcing the actions of a decision.
    pub fn assistant_with_actions(content: impl Into<String>, actions: &[ActionRequest]) -> Self {
        let mut msg = Self::assistant(content);
        msg.tool_calls = actions.iter().map(MessageToolCall::from).collect();
        msg
    }

    /// Create a tool result message from an observation.
    ///
    /// The content is the payload on success and the error detail otherwise.
    pub fn tool_result(observation: Observation) -> Self {
        let mut msg = Self::with_role(Role::Tool, observation.content_text());
        msg.tool_call_id = Some(observation.call_id.clone());
        msg.observation = Some(observation);
        msg
    }
}

/// A tool call embedded in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageToolCall {
    /// Unique ID for this tool call
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as JSON string
    pub arguments: String,
}

impl From<&ActionRequest> for MessageToolCall {
    fn from(action: &ActionRequest) -> Self {
        Self {
            id: action.call_id.clone(),
            name: action.tool_name.clone(),
            arguments: serde_json::Value::Object(action.args.clone()).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ObservationStatus;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Take me to Central Park");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Take me to Central Park");
        assert!(msg.tool_calls.is_empty());
        assert!(msg.observation.is_none());
    }

    #[test]
    fn assistant_with_actions_lists_tool_calls() {
        let action = ActionRequest::new(
            "call_1",
            "set_destination",
            serde_json::json!({"poi_name": "Central Park"}),
        );
        let msg = Message::assistant_with_actions("", std::slice::from_ref(&action));
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "call_1");
        assert!(msg.tool_calls[0].arguments.contains("Central Park"));
    }

    #[test]
    fn tool_result_carries_observation() {
        let action = ActionRequest::new("call_9", "get_weather", serde_json::json!({"city": "Paris"}));
        let obs = Observation::failure(&action, "upstream unavailable");
        let msg = Message::tool_result(obs);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_9"));
        assert_eq!(msg.content, "upstream unavailable");
        assert_eq!(
            msg.observation.as_ref().map(|o| o.status),
            Some(ObservationStatus::Error)
        );
    }

    #[test]
    fn conversation_id_serializes_as_plain_string() {
        let id = ConversationId::from("conv-42");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conv-42\"");
    }
}

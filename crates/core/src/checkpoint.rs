//! Checkpoint store trait: durable storage for conversation state.
//!
//! The run controller saves after every node transition, so implementations
//! must treat `save` as an idempotent overwrite of the previous snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::interrupt::InterruptKind;
use crate::message::ConversationId;
use crate::state::{ConversationState, RunNode};

/// A lightweight listing entry for a stored checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSummary {
    pub conversation_id: ConversationId,
    pub node: RunNode,
    pub message_count: usize,
    pub total_tool_calls: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<InterruptKind>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ConversationState> for CheckpointSummary {
    fn from(state: &ConversationState) -> Self {
        Self {
            conversation_id: state.conversation_id.clone(),
            node: state.node,
            message_count: state.messages.len(),
            total_tool_calls: state.total_tool_calls,
            pending_interrupt: state.pending_interrupt.as_ref().map(|p| p.request.kind),
            updated_at: state.updated_at,
        }
    }
}

/// The core checkpoint storage trait.
///
/// Implementations: in-memory (tests), JSON files, SQLite.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Load the latest snapshot for a conversation.
    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, CheckpointError>;

    /// Persist a snapshot, replacing any previous one for the same conversation.
    async fn save(&self, state: &ConversationState) -> Result<(), CheckpointError>;

    /// Remove a conversation's snapshot. Returns whether one existed.
    async fn delete(&self, id: &ConversationId) -> Result<bool, CheckpointError>;

    /// Summaries of all stored conversations, most recently updated first.
    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError>;
}

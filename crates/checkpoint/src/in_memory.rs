//! In-memory checkpoint store: useful for testing and ephemeral sessions.
//!
//! Snapshots are kept as serialized JSON so a load always goes through the
//! same round-trip a durable store would.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use waypoint_core::{
    CheckpointError, CheckpointStore, CheckpointSummary, ConversationId, ConversationState,
};

pub struct InMemoryCheckpointStore {
    snapshots: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self {
            snapshots: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored conversations.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

impl Default for InMemoryCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(id.as_str())
            .map(|json| serde_json::from_str(json).map_err(CheckpointError::from))
            .transpose()
    }

    async fn save(&self, state: &ConversationState) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(state)?;
        self.snapshots
            .write()
            .await
            .insert(state.conversation_id.as_str().to_string(), json);
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, CheckpointError> {
        Ok(self.snapshots.write().await.remove(id.as_str()).is_some())
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let snapshots = self.snapshots.read().await;
        let mut summaries = snapshots
            .values()
            .map(|json| {
                serde_json::from_str::<ConversationState>(json)
                    .map(|state| CheckpointSummary::from(&state))
                    .map_err(CheckpointError::from)
            })
            .collect::<Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

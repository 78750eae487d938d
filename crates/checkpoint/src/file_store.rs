//! File-based checkpoint store: one JSON document per conversation.
//!
//! Storage location: `~/.waypoint/checkpoints/<conversation>.json` by default.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! crash mid-write leaves the previous snapshot intact.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use waypoint_core::{
    CheckpointError, CheckpointStore, CheckpointSummary, ConversationId, ConversationState,
};

pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        debug!(dir = %dir.display(), "File checkpoint store ready");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name for a conversation id.
    ///
    /// Ids made only of ASCII alphanumerics, `-` and `_` are used as-is;
    /// anything else is hex-encoded so it cannot escape the directory.
    fn path_for(&self, id: &ConversationId) -> PathBuf {
        let raw = id.as_str();
        let safe = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        let stem = if safe {
            raw.to_string()
        } else {
            format!("x{}", hex::encode(raw.as_bytes()))
        };
        self.dir.join(format!("{stem}.json"))
    }

    async fn read_state(path: &Path) -> Result<Option<ConversationState>, CheckpointError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CheckpointError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            ))),
        }
    }
}

fn storage_err(context: &str, path: &Path, e: std::io::Error) -> CheckpointError {
    CheckpointError::Storage(format!("{context} {}: {e}", path.display()))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, CheckpointError> {
        Self::read_state(&self.path_for(id)).await
    }

    async fn save(&self, state: &ConversationState) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| storage_err("Failed to create", &self.dir, e))?;

        let path = self.path_for(&state.conversation_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;

        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| storage_err("Failed to write", &tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_err("Failed to replace", &path, e))?;

        debug!(
            conversation_id = %state.conversation_id,
            node = state.node.as_str(),
            "Checkpoint written"
        );
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, CheckpointError> {
        let path = self.path_for(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err("Failed to delete", &path, e)),
        }
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(storage_err("Failed to list", &self.dir, e)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| storage_err("Failed to list", &self.dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::read_state(&path).await {
                Ok(Some(state)) => summaries.push(CheckpointSummary::from(&state)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}

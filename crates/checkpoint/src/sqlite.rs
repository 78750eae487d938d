//! SQLite checkpoint store.
//!
//! One row per conversation in the `checkpoints` table. The full state is
//! stored as JSON; a few columns are denormalized so listing does not have to
//! parse every snapshot.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};
use waypoint_core::{
    CheckpointError, CheckpointStore, CheckpointSummary, ConversationId, ConversationState,
    InterruptKind, RunNode,
};

pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn new(path: &Path) -> Result<Self, CheckpointError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                CheckpointError::Storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| CheckpointError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite checkpoint store initialized at {}", path.display());
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, CheckpointError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS checkpoints (
                conversation_id    TEXT PRIMARY KEY NOT NULL,
                node               TEXT NOT NULL,
                pending_interrupt  TEXT,
                message_count      INTEGER NOT NULL,
                total_tool_calls   INTEGER NOT NULL,
                updated_at         TEXT NOT NULL,
                state              TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("checkpoints table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_checkpoints_updated ON checkpoints(updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("updated_at index: {e}")))?;

        Ok(())
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<CheckpointSummary, CheckpointError> {
        let get_err = |e: sqlx::Error| CheckpointError::Storage(format!("Row decode: {e}"));

        let id: String = row.try_get("conversation_id").map_err(get_err)?;
        let node: String = row.try_get("node").map_err(get_err)?;
        let pending: Option<String> = row.try_get("pending_interrupt").map_err(get_err)?;
        let message_count: i64 = row.try_get("message_count").map_err(get_err)?;
        let total_tool_calls: i64 = row.try_get("total_tool_calls").map_err(get_err)?;
        let updated_at: String = row.try_get("updated_at").map_err(get_err)?;

        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CheckpointError::Serialization(format!("updated_at: {e}")))?;

        Ok(CheckpointSummary {
            conversation_id: ConversationId(id),
            node: parse_label::<RunNode>(&node)?,
            message_count: message_count.max(0) as usize,
            total_tool_calls: total_tool_calls.max(0) as u32,
            pending_interrupt: pending.as_deref().map(parse_label::<InterruptKind>).transpose()?,
            updated_at,
        })
    }
}

/// Parse a snake_case enum label stored as plain text.
fn parse_label<T: serde::de::DeserializeOwned>(label: &str) -> Result<T, CheckpointError> {
    Ok(serde_json::from_value(serde_json::Value::String(label.to_string()))?)
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn load(&self, id: &ConversationId) -> Result<Option<ConversationState>, CheckpointError> {
        let row = sqlx::query("SELECT state FROM checkpoints WHERE conversation_id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        match row {
            Some(row) => {
                let json: String = row
                    .try_get("state")
                    .map_err(|e| CheckpointError::Storage(format!("Row decode: {e}")))?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &ConversationState) -> Result<(), CheckpointError> {
        let json = serde_json::to_string(state)?;
        let pending = state
            .pending_interrupt
            .as_ref()
            .map(|p| p.request.kind.as_str());

        sqlx::query(
            r#"
            INSERT INTO checkpoints
                (conversation_id, node, pending_interrupt, message_count, total_tool_calls, updated_at, state)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(conversation_id) DO UPDATE SET
                node = excluded.node,
                pending_interrupt = excluded.pending_interrupt,
                message_count = excluded.message_count,
                total_tool_calls = excluded.total_tool_calls,
                updated_at = excluded.updated_at,
                state = excluded.state
            "#,
        )
        .bind(state.conversation_id.as_str())
        .bind(state.node.as_str())
        .bind(pending)
        .bind(state.messages.len() as i64)
        .bind(i64::from(state.total_tool_calls))
        .bind(state.updated_at.to_rfc3339())
        .bind(&json)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("UPSERT failed: {e}")))?;

        debug!(
            conversation_id = %state.conversation_id,
            node = state.node.as_str(),
            "Checkpoint written"
        );
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<bool, CheckpointError> {
        let result = sqlx::query("DELETE FROM checkpoints WHERE conversation_id = ?1")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| CheckpointError::Storage(format!("DELETE failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<CheckpointSummary>, CheckpointError> {
        let rows = sqlx::query(
            r#"
            SELECT conversation_id, node, pending_interrupt, message_count, total_tool_calls, updated_at
            FROM checkpoints
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(format!("SELECT failed: {e}")))?;

        rows.iter().map(Self::row_to_summary).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_state;
    use waypoint_core::{ActionRequest, InterruptPayload, InterruptRequest, PendingInterrupt};

    async fn test_store(dir: &tempfile::TempDir) -> SqliteCheckpointStore {
        SqliteCheckpointStore::new(&dir.path().join("checkpoints.db"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let state = sample_state("conv-1");
        store.save(&state).await.unwrap();

        let loaded = store.load(&state.conversation_id).await.unwrap().unwrap();
        assert_eq!(loaded.total_tool_calls, 1);
        assert_eq!(loaded.messages.len(), state.messages.len());
    }

    #[tokio::test]
    async fn upsert_on_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let mut state = sample_state("conv-1");
        store.save(&state).await.unwrap();

        state.total_tool_calls = 3;
        state.node = RunNode::Done;
        store.save(&state).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].total_tool_calls, 3);
        assert_eq!(listed[0].node, RunNode::Done);
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state("durable");
        {
            let store = test_store(&dir).await;
            store.save(&state).await.unwrap();
        }
        let reopened = test_store(&dir).await;
        assert!(reopened.load(&state.conversation_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_reports_pending_interrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        let mut state = sample_state("suspended");
        let action = ActionRequest::new("call_2", "pay_order", serde_json::json!({"order_id": "o1"}));
        state
            .park_interrupt(PendingInterrupt {
                request: InterruptRequest {
                    kind: InterruptKind::Confirmation,
                    tool_name: "pay_order".into(),
                    call_id: "call_2".into(),
                    message: "Pay for order o1?".into(),
                    payload: InterruptPayload::Confirmation {
                        args: action.args.clone(),
                    },
                },
                action,
            })
            .unwrap();
        state.node = RunNode::Suspended;
        store.save(&state).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed[0].pending_interrupt, Some(InterruptKind::Confirmation));
        assert_eq!(listed[0].node, RunNode::Suspended);
    }

    #[tokio::test]
    async fn delete_nonexistent() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(&dir).await;
        assert!(!store.delete(&ConversationId::from("nope")).await.unwrap());
    }
}

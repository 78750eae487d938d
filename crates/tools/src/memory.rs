//! Memory tools: remember user preferences and frequent locations.
//!
//! These are the stock "silent" tools. They run like any other tool but
//! their results are left out of the user-facing reply.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use waypoint_core::error::ToolError;
use waypoint_core::tool::{Tool, ToolResult};

use crate::required_str;

/// Preference categories the store accepts.
pub const PREFERENCE_CATEGORIES: [&str; 4] = ["navigation", "music", "food", "vehicle"];

#[derive(Debug, Clone, Serialize)]
pub struct SavedLocation {
    pub label: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poi_id: Option<String>,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// category -> key -> value
    preferences: BTreeMap<String, BTreeMap<String, String>>,
    /// label -> location
    locations: BTreeMap<String, SavedLocation>,
}

/// In-process memory shared by the memory tools.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn preference(&self, category: &str, key: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .preferences
            .get(category)
            .and_then(|prefs| prefs.get(key))
            .cloned()
    }

    pub async fn location(&self, label: &str) -> Option<SavedLocation> {
        self.inner.read().await.locations.get(label).cloned()
    }

    pub async fn location_count(&self) -> usize {
        self.inner.read().await.locations.len()
    }
}

// ── memory_save_preference ────────────────────────────────────────────────

pub struct MemorySavePreferenceTool {
    store: MemoryStore,
}

impl MemorySavePreferenceTool {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySavePreferenceTool {
    fn name(&self) -> &str {
        "memory_save_preference"
    }

    fn description(&self) -> &str {
        "Remember a user preference, e.g. navigation/avoid_highway = true or music/favorite_genre = jazz."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "category": { "type": "string", "enum": PREFERENCE_CATEGORIES },
                "key": { "type": "string" },
                "value": { "type": "string" }
            },
            "required": ["category", "key", "value"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let category = required_str(&arguments, "category")?;
        let key = required_str(&arguments, "key")?;
        // Non-string values are kept in their JSON form.
        let value = match &arguments["value"] {
            serde_json::Value::String(s) => s.trim().to_string(),
            serde_json::Value::Null => {
                return Err(ToolError::InvalidArguments("Missing 'value' argument".into()));
            }
            other => other.to_string(),
        };

        if !PREFERENCE_CATEGORIES.contains(&category) {
            return Ok(ToolResult::failed(format!(
                "Invalid preference category '{category}', expected one of: {}",
                PREFERENCE_CATEGORIES.join(", ")
            )));
        }

        self.store
            .inner
            .write()
            .await
            .preferences
            .entry(category.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());

        tracing::debug!(category, key, "Preference saved");
        Ok(ToolResult::ok(format!("Saved preference [{category}] {key} = {value}")))
    }
}

// ── memory_save_location ──────────────────────────────────────────────────

pub struct MemorySaveLocationTool {
    store: MemoryStore,
}

impl MemorySaveLocationTool {
    pub fn new(store: MemoryStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySaveLocationTool {
    fn name(&self) -> &str {
        "memory_save_location"
    }

    fn description(&self) -> &str {
        "Remember a frequently used address under a label such as \"home\" or \"office\"."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "label": { "type": "string", "description": "Short label, e.g. home" },
                "address": { "type": "string", "description": "Full address" },
                "poi_id": { "type": "string", "description": "Optional id from search_poi" }
            },
            "required": ["label", "address"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let label = required_str(&arguments, "label")?;
        let address = required_str(&arguments, "address")?;
        let poi_id = arguments["poi_id"].as_str().map(String::from);

        let location = SavedLocation {
            label: label.to_string(),
            address: address.to_string(),
            poi_id,
            saved_at: Utc::now(),
        };
        self.store
            .inner
            .write()
            .await
            .locations
            .insert(label.to_string(), location);

        tracing::debug!(label, "Location saved");
        Ok(ToolResult::ok(format!("Saved location '{label}' -> '{address}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_preference_then_read_back() {
        let store = MemoryStore::new();
        let tool = MemorySavePreferenceTool::new(store.clone());
        let result = tool
            .execute(serde_json::json!({
                "category": "navigation",
                "key": "avoid_highway",
                "value": true
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            store.preference("navigation", "avoid_highway").await.as_deref(),
            Some("true")
        );
    }

    #[tokio::test]
    async fn unknown_category_fails_softly() {
        let tool = MemorySavePreferenceTool::new(MemoryStore::new());
        let result = tool
            .execute(serde_json::json!({"category": "weather", "key": "k", "value": "v"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("navigation"));
    }

    #[tokio::test]
    async fn save_location_overwrites_label() {
        let store = MemoryStore::new();
        let tool = MemorySaveLocationTool::new(store.clone());
        tool.execute(serde_json::json!({"label": "home", "address": "1 Old Road"}))
            .await
            .unwrap();
        tool.execute(serde_json::json!({"label": "home", "address": "9 New Street"}))
            .await
            .unwrap();

        assert_eq!(store.location_count().await, 1);
        assert_eq!(store.location("home").await.unwrap().address, "9 New Street");
    }

    #[tokio::test]
    async fn save_location_requires_address() {
        let tool = MemorySaveLocationTool::new(MemoryStore::new());
        assert!(tool.execute(serde_json::json!({"label": "gym"})).await.is_err());
    }
}

//! Navigation tools: POI search and route control.
//!
//! `search_poi` returns a list of candidate places, which is what makes it a
//! natural source for a selection interrupt. The route-control tools share a
//! [`NavigationSession`] so a destination set in one call is visible to the
//! next.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use waypoint_core::error::ToolError;
use waypoint_core::tool::{Tool, ToolResult};

use crate::{required_str, stable_hash};

// ── Session ───────────────────────────────────────────────────────────────

/// Current route state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteState {
    pub destination: Option<String>,
    pub via: Vec<String>,
    pub navigating: bool,
}

/// Shared, cloneable handle on the route state.
#[derive(Clone, Default)]
pub struct NavigationSession {
    state: Arc<RwLock<RouteState>>,
}

impl NavigationSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> RouteState {
        self.state.read().await.clone()
    }
}

// ── search_poi ────────────────────────────────────────────────────────────

pub struct SearchPoiTool;

#[derive(Serialize)]
struct Poi {
    poi_id: String,
    name: String,
    address: String,
    distance_m: u32,
}

const POI_SUFFIXES: [(&str, &str); 5] = [
    ("", "Main Street"),
    (" (North Entrance)", "North Avenue"),
    (" Plaza", "Harbor Road"),
    (" East", "Riverside Drive"),
    (" Center", "Station Square"),
];

fn mock_pois(keyword: &str, limit: usize) -> Vec<Poi> {
    let hash = stable_hash(keyword);
    // Between 1 and 5 hits, varying by keyword.
    let count = (1 + (hash as usize % POI_SUFFIXES.len())).min(limit);
    POI_SUFFIXES
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, (suffix, street))| Poi {
            poi_id: format!("poi_{:08x}_{i}", hash),
            name: format!("{keyword}{suffix}"),
            address: format!("{} {street}", 10 + (hash as usize / (i + 1)) % 890),
            distance_m: 300 + ((hash / (i as u32 + 2)) % 9_700),
        })
        .collect()
}

#[async_trait]
impl Tool for SearchPoiTool {
    fn name(&self) -> &str {
        "search_poi"
    }

    fn description(&self) -> &str {
        "Search for places (points of interest) by keyword. Returns a list of matches with name, address and distance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "keyword": {
                    "type": "string",
                    "description": "What to search for, e.g. a place name or category"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results (default 5)",
                    "default": 5
                }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let keyword = required_str(&arguments, "keyword")?;
        let limit = arguments["limit"].as_u64().unwrap_or(5).clamp(1, 20) as usize;
        let pois = mock_pois(keyword, limit);
        Ok(ToolResult::json(serde_json::json!({ "pois": pois })))
    }
}

// ── set_destination ───────────────────────────────────────────────────────

pub struct SetDestinationTool {
    session: NavigationSession,
}

impl SetDestinationTool {
    pub fn new(session: NavigationSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for SetDestinationTool {
    fn name(&self) -> &str {
        "set_destination"
    }

    fn description(&self) -> &str {
        "Set the navigation destination. Replaces any previous destination and clears stops."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "poi_name": { "type": "string", "description": "Destination name" },
                "poi_id": { "type": "string", "description": "Optional id from search_poi" }
            },
            "required": ["poi_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let poi_name = required_str(&arguments, "poi_name")?;
        let mut state = self.session.state.write().await;
        state.destination = Some(poi_name.to_string());
        state.via.clear();
        Ok(ToolResult::json(serde_json::json!({
            "destination": poi_name,
            "status": "destination_set",
        })))
    }
}

// ── add_via_poi ───────────────────────────────────────────────────────────

pub struct AddViaPoiTool {
    session: NavigationSession,
}

impl AddViaPoiTool {
    pub fn new(session: NavigationSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for AddViaPoiTool {
    fn name(&self) -> &str {
        "add_via_poi"
    }

    fn description(&self) -> &str {
        "Add an intermediate stop to the current route. Requires a destination."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "poi_name": { "type": "string", "description": "Name of the stop" }
            },
            "required": ["poi_name"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let poi_name = required_str(&arguments, "poi_name")?;
        let mut state = self.session.state.write().await;
        if state.destination.is_none() {
            return Ok(ToolResult::failed("No destination set; cannot add a stop"));
        }
        state.via.push(poi_name.to_string());
        Ok(ToolResult::json(serde_json::json!({
            "via": state.via,
            "status": "via_added",
        })))
    }
}

// ── start_navigation / stop_navigation ────────────────────────────────────

pub struct StartNavigationTool {
    session: NavigationSession,
}

impl StartNavigationTool {
    pub fn new(session: NavigationSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for StartNavigationTool {
    fn name(&self) -> &str {
        "start_navigation"
    }

    fn description(&self) -> &str {
        "Start route guidance to a destination."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "destination": { "type": "string", "description": "Where to navigate to" }
            },
            "required": ["destination"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let destination = required_str(&arguments, "destination")?;
        let mut state = self.session.state.write().await;
        state.destination = Some(destination.to_string());
        state.navigating = true;

        let hash = stable_hash(destination);
        Ok(ToolResult::json(serde_json::json!({
            "destination": destination,
            "via": state.via,
            "eta_minutes": 5 + hash % 55,
            "distance_km": f64::from(1 + hash % 400) / 10.0,
            "status": "navigating",
        })))
    }
}

pub struct StopNavigationTool {
    session: NavigationSession,
}

impl StopNavigationTool {
    pub fn new(session: NavigationSession) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Tool for StopNavigationTool {
    fn name(&self) -> &str {
        "stop_navigation"
    }

    fn description(&self) -> &str {
        "Stop the current route guidance."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let mut state = self.session.state.write().await;
        if !state.navigating {
            return Ok(ToolResult::failed("Navigation is not active"));
        }
        *state = RouteState::default();
        Ok(ToolResult::json(serde_json::json!({ "status": "stopped" })))
    }
}

//! Built-in tool implementations for Waypoint.
//!
//! The tools give the assistant an in-car domain to act in: search for
//! places, steer navigation, check the weather, query and book trains, and
//! remember user preferences. Backends are deterministic in-process mocks
//! so the run loop can be exercised end-to-end without network access.

pub mod memory;
pub mod navigation;
pub mod tickets;
pub mod weather;

use waypoint_core::error::ToolError;
use waypoint_core::tool::ToolRegistry;

pub use memory::{MemorySaveLocationTool, MemorySavePreferenceTool, MemoryStore};
pub use navigation::{
    AddViaPoiTool, NavigationSession, SearchPoiTool, SetDestinationTool, StartNavigationTool,
    StopNavigationTool,
};
pub use tickets::{BookTicketTool, QueryTicketsTool};
pub use weather::GetWeatherTool;

/// Create a default tool registry with all built-in tools.
///
/// The navigation tools share one session and the memory tools share one
/// store, both private to the returned registry.
pub fn default_registry() -> ToolRegistry {
    registry_with(NavigationSession::new(), MemoryStore::new())
}

/// Build the built-in registry around caller-owned backends.
pub fn registry_with(session: NavigationSession, store: MemoryStore) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(SearchPoiTool));
    registry.register(Box::new(SetDestinationTool::new(session.clone())));
    registry.register(Box::new(AddViaPoiTool::new(session.clone())));
    registry.register(Box::new(StartNavigationTool::new(session.clone())));
    registry.register(Box::new(StopNavigationTool::new(session)));
    registry.register(Box::new(GetWeatherTool));
    registry.register(Box::new(QueryTicketsTool));
    registry.register(Box::new(BookTicketTool));
    registry.register(Box::new(MemorySavePreferenceTool::new(store.clone())));
    registry.register(Box::new(MemorySaveLocationTool::new(store)));
    registry
}

/// Read a required, non-blank string argument.
pub(crate) fn required_str<'a>(
    arguments: &'a serde_json::Value,
    key: &str,
) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Deterministic hash so mock backends vary by input but never by run.
pub(crate) fn stable_hash(input: &str) -> u32 {
    input
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
}

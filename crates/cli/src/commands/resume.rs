//! `waypoint resume`: Answer a suspended conversation from the command line.

use std::path::Path;
use waypoint_core::ConversationId;

use super::answer::parse_value;
use super::render::print_outcome;

pub async fn run(
    config_path: Option<&Path>,
    conversation: String,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let value = parse_value(value).ok_or_else(|| {
        format!("Cannot read '{value}': use confirm, cancel, a candidate number, or JSON")
    })?;

    let runtime = waypoint_agent::build_from_config(&config).await?;
    let id = ConversationId(conversation);
    tracing::debug!(conversation_id = %id, shape = value.shape(), "Resuming from the command line");
    let outcome = runtime.controller.resume_turn(&id, value).await?;
    print_outcome(id.as_str(), &outcome);
    Ok(())
}

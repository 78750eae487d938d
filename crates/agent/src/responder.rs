//! Responder: the final user-visible message of a turn.

use std::collections::HashSet;
use waypoint_core::{BudgetExceeded, ConversationState, Observation, ObservationStatus};

/// Sent when there is neither a draft nor a visible result to report.
pub const EMPTY_REPLY: &str = "Done. Is there anything else I can help with?";

/// Composes the final message from the draft response and the last
/// execution pass, or a fixed text when a budget stopped the turn.
#[derive(Debug, Clone, Default)]
pub struct Responder {
    silent_tools: HashSet<String>,
}

impl Responder {
    pub fn new<I, S>(silent_tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            silent_tools: silent_tools.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_silent(&self, tool_name: &str) -> bool {
        self.silent_tools.contains(tool_name)
    }

    pub fn compose(&self, state: &ConversationState) -> String {
        if let Some(reason) = &state.stop_reason {
            return budget_message(reason);
        }

        let draft = state
            .decision
            .as_ref()
            .map(|d| d.draft_response().trim())
            .unwrap_or_default();

        let lines: Vec<String> = state
            .observations
            .iter()
            .filter(|obs| !self.is_silent(&obs.tool_name))
            .map(summary_line)
            .collect();

        match (draft.is_empty(), lines.is_empty()) {
            (true, true) => EMPTY_REPLY.to_string(),
            (false, true) => draft.to_string(),
            (true, false) => format!("Results:\n{}", lines.join("\n")),
            (false, false) => format!("{draft}\n\nResults:\n{}", lines.join("\n")),
        }
    }
}

fn summary_line(obs: &Observation) -> String {
    match obs.status {
        ObservationStatus::Success => format!("✓ {}: succeeded", obs.tool_name),
        ObservationStatus::Error => format!(
            "✗ {}: failed ({})",
            obs.tool_name,
            obs.error_detail.as_deref().unwrap_or("unknown error")
        ),
        ObservationStatus::Cancelled => format!("⊘ {}: cancelled", obs.tool_name),
    }
}

/// The fixed termination text for a budget stop.
pub fn budget_message(reason: &BudgetExceeded) -> String {
    match reason {
        BudgetExceeded::Iterations { limit } => format!(
            "Sorry, this request needed more than {limit} reasoning steps, so I stopped here. Please simplify the request or ask again."
        ),
        BudgetExceeded::ToolCalls { limit } => format!(
            "Sorry, this conversation has reached its limit of {limit} tool calls. Please start a new conversation."
        ),
        BudgetExceeded::WallClock { limit_secs } => format!(
            "Sorry, this request took longer than {limit_secs} seconds, so I stopped working on it. Please try again."
        ),
    }
}

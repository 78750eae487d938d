//! Run-level streaming events.
//!
//! `RunEvent`s describe a turn as it happens; the gateway forwards them to
//! clients over SSE and the CLI prints them.

use serde::{Deserialize, Serialize};
use waypoint_core::{ActionRequest, BudgetExceeded, InterruptRequest, ObservationStatus};

/// Events emitted while a turn (or a resumed turn) is driven.
///
/// - `thought`          - the reasoner produced a decision
/// - `tool_result`      - an action finished
/// - `action_skipped`   - a duplicate action was dropped
/// - `interrupt`        - the run suspended for human input
/// - `budget_exceeded`  - a budget stopped the turn
/// - `done`             - the final message
/// - `error`            - the run could not continue
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    Thought {
        iteration: u32,
        rationale: String,
        actions: Vec<ActionRequest>,
    },

    ToolResult {
        call_id: String,
        tool_name: String,
        status: ObservationStatus,
        content: String,
    },

    ActionSkipped { call_id: String, tool_name: String },

    Interrupt { interrupt: InterruptRequest },

    BudgetExceeded { reason: BudgetExceeded },

    Done {
        conversation_id: String,
        message: String,
        expects_reply: bool,
        iteration_count: u32,
        total_tool_calls: u32,
    },

    Error { message: String },
}

impl RunEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::ToolResult { .. } => "tool_result",
            Self::ActionSkipped { .. } => "action_skipped",
            Self::Interrupt { .. } => "interrupt",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Interrupt { .. } | Self::Done { .. } | Self::Error { .. })
    }
}

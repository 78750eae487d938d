//! Hard resource budgets for a run.
//!
//! [`Budgets`] is a plain value handed to whoever enforces it; there is no
//! global counter anywhere. The counters themselves live on the
//! conversation state.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide budget limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budgets {
    /// Maximum action-yielding reasoning iterations per turn
    pub max_iterations: u32,

    /// Maximum real tool invocations per conversation
    pub max_total_tool_calls: u32,

    /// Maximum active processing time per turn
    pub wall_clock_timeout: Duration,

    /// Timeout applied to each single tool invocation
    pub tool_timeout: Duration,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            max_total_tool_calls: 50,
            wall_clock_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

impl Budgets {
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_max_total_tool_calls(mut self, max: u32) -> Self {
        self.max_total_tool_calls = max;
        self
    }

    pub fn with_wall_clock_timeout(mut self, timeout: Duration) -> Self {
        self.wall_clock_timeout = timeout;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }
}

/// Which budget stopped a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "budget", rename_all = "snake_case")]
pub enum BudgetExceeded {
    WallClock { limit_secs: u64 },
    ToolCalls { limit: u32 },
    Iterations { limit: u32 },
}

impl BudgetExceeded {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WallClock { .. } => "wall_clock",
            Self::ToolCalls { .. } => "tool_calls",
            Self::Iterations { .. } => "iterations",
        }
    }
}

impl std::fmt::Display for BudgetExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WallClock { limit_secs } => write!(f, "wall-clock limit of {limit_secs}s reached"),
            Self::ToolCalls { limit } => write!(f, "tool-call limit of {limit} reached"),
            Self::Iterations { limit } => write!(f, "iteration limit of {limit} reached"),
        }
    }
}

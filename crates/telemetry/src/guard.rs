//! Budget guard: hard stops independent of the reasoner.
//!
//! Checks run in a fixed order: wall-clock since the turn started, then the
//! conversation's tool-call cap, then the turn's iteration cap. The first
//! limit hit is the one reported.

use std::time::Duration;

use waypoint_core::{BudgetExceeded, Budgets, ConversationState};

/// Verdict before invoking the reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationCheck {
    Continue,
    Stop(BudgetExceeded),
}

/// Verdict before invoking a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionCheck {
    Allow,
    Deny(BudgetExceeded),
}

/// Enforces a [`Budgets`] value against one conversation's counters.
///
/// The guard holds no counters of its own. Callers serialize access per
/// conversation, so a check and the increment that follows it cannot race.
#[derive(Debug, Clone, Copy)]
pub struct BudgetGuard {
    budgets: Budgets,
}

impl BudgetGuard {
    pub fn new(budgets: Budgets) -> Self {
        Self { budgets }
    }

    pub fn budgets(&self) -> &Budgets {
        &self.budgets
    }

    /// May the run invoke the reasoner for another iteration?
    pub fn check_before_iteration(&self, state: &ConversationState) -> IterationCheck {
        if let Some(reason) = self.wall_clock_exceeded(state) {
            return IterationCheck::Stop(reason);
        }
        if state.total_tool_calls >= self.budgets.max_total_tool_calls {
            return IterationCheck::Stop(BudgetExceeded::ToolCalls {
                limit: self.budgets.max_total_tool_calls,
            });
        }
        if state.iteration_count >= self.budgets.max_iterations {
            return IterationCheck::Stop(BudgetExceeded::Iterations {
                limit: self.budgets.max_iterations,
            });
        }
        IterationCheck::Continue
    }

    /// May the run invoke a tool now?
    pub fn check_before_action(&self, state: &ConversationState) -> ActionCheck {
        if let Some(reason) = self.wall_clock_exceeded(state) {
            return ActionCheck::Deny(reason);
        }
        if state.total_tool_calls >= self.budgets.max_total_tool_calls {
            return ActionCheck::Deny(BudgetExceeded::ToolCalls {
                limit: self.budgets.max_total_tool_calls,
            });
        }
        if state.iteration_count > self.budgets.max_iterations {
            return ActionCheck::Deny(BudgetExceeded::Iterations {
                limit: self.budgets.max_iterations,
            });
        }
        ActionCheck::Allow
    }

    /// Count one real tool invocation.
    ///
    /// Only called after `check_before_action` allowed the call, so the
    /// counter never passes the cap.
    pub fn record_tool_call(&self, state: &mut ConversationState) {
        debug_assert!(state.total_tool_calls < self.budgets.max_total_tool_calls);
        state.total_tool_calls = state
            .total_tool_calls
            .saturating_add(1)
            .min(self.budgets.max_total_tool_calls);
    }

    /// Wall-clock time the turn may still use.
    pub fn remaining_time(&self, state: &ConversationState) -> Duration {
        self.budgets
            .wall_clock_timeout
            .saturating_sub(state.clock.elapsed())
    }

    fn wall_clock_exceeded(&self, state: &ConversationState) -> Option<BudgetExceeded> {
        (state.clock.elapsed() >= self.budgets.wall_clock_timeout).then(|| BudgetExceeded::WallClock {
            limit_secs: self.budgets.wall_clock_timeout.as_secs(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_core::ConversationId;

    fn state() -> ConversationState {
        let mut s = ConversationState::new(ConversationId::from("c"));
        s.begin_turn("hi", true);
        s
    }

    fn guard() -> BudgetGuard {
        BudgetGuard::new(Budgets::default().with_max_iterations(3).with_max_total_tool_calls(5))
    }

    #[test]
    fn fresh_turn_continues_and_allows() {
        let s = state();
        assert_eq!(guard().check_before_iteration(&s), IterationCheck::Continue);
        assert_eq!(guard().check_before_action(&s), ActionCheck::Allow);
    }

    #[test]
    fn iteration_cap_stops_reasoning() {
        let mut s = state();
        s.iteration_count = 3;
        assert_eq!(
            guard().check_before_iteration(&s),
            IterationCheck::Stop(BudgetExceeded::Iterations { limit: 3 })
        );
        // Actions of the last permitted iteration may still run.
        assert_eq!(guard().check_before_action(&s), ActionCheck::Allow);
    }

    #[test]
    fn tool_cap_denies_forever_once_reached() {
        let g = guard();
        let mut s = state();
        for _ in 0..5 {
            assert_eq!(g.check_before_action(&s), ActionCheck::Allow);
            g.record_tool_call(&mut s);
        }
        assert_eq!(s.total_tool_calls, 5);
        for _ in 0..3 {
            assert_eq!(
                g.check_before_action(&s),
                ActionCheck::Deny(BudgetExceeded::ToolCalls { limit: 5 })
            );
        }
    }

    #[test]
    fn wall_clock_is_checked_first() {
        let mut s = state();
        s.iteration_count = 3;
        s.total_tool_calls = 5;
        s.clock.active_ms = 121_000;
        assert_eq!(
            guard().check_before_iteration(&s),
            IterationCheck::Stop(BudgetExceeded::WallClock { limit_secs: 120 })
        );
        assert_eq!(
            guard().check_before_action(&s),
            ActionCheck::Deny(BudgetExceeded::WallClock { limit_secs: 120 })
        );
    }

    #[test]
    fn tool_cap_is_checked_before_iterations() {
        let mut s = state();
        s.iteration_count = 3;
        s.total_tool_calls = 5;
        assert_eq!(
            guard().check_before_iteration(&s),
            IterationCheck::Stop(BudgetExceeded::ToolCalls { limit: 5 })
        );
    }

    #[test]
    fn remaining_time_shrinks_with_elapsed() {
        let mut s = state();
        s.clock.pause();
        s.clock.active_ms = 100_000;
        assert!(guard().remaining_time(&s) <= Duration::from_secs(20));
        s.clock.active_ms = 500_000;
        assert_eq!(guard().remaining_time(&s), Duration::ZERO);
    }
}

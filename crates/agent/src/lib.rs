//! The Waypoint execution core: a resumable, human-in-the-loop tool-use run.
//!
//! A user turn moves through a small state machine owned by
//! [`RunController`]:
//!
//! 1. **Reason**: the [`Reasoner`] reads the conversation and returns a
//!    [`Decision`](waypoint_core::Decision) (answer now, or run actions)
//! 2. **Execute**: the [`Executor`] runs the decision's actions one per step,
//!    skipping repeats ([`DedupTracker`]) and consulting the
//!    [`InterruptController`] before and after each tool
//! 3. **Suspend** when a human must fill in parameters, confirm, or pick one
//!    of several results; the run is checkpointed and resumed later, possibly
//!    in another process
//! 4. **Respond**: the [`Responder`] turns the draft answer and the last
//!    observations into the final message
//!
//! Budgets (wall-clock, tool calls, iterations) can end the turn at any
//! step with a fixed message.

pub mod classifier;
pub mod controller;
pub mod decision;
pub mod dedup;
pub mod executor;
pub mod interrupt;
pub mod reasoner;
pub mod responder;
pub mod runtime;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use classifier::{Classifier, KeywordClassifier};
pub use controller::{RunController, RunError, TurnOutcome, TurnReply};
pub use decision::{ParseFailure, fallback_decision, parse_decision};
pub use dedup::DedupTracker;
pub use executor::{Executor, StepOutcome};
pub use interrupt::{InterruptController, ResumeMismatch, ResumeOutcome};
pub use reasoner::{LlmReasoner, Reasoner};
pub use responder::{Responder, budget_message};
pub use runtime::{Runtime, build_from_config, build_with_provider, open_checkpoint_store};
pub use stream_event::RunEvent;

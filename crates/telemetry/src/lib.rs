//! Budget enforcement and execution tracing for Waypoint runs.
//!
//! [`BudgetGuard`] decides when a run must stop regardless of what the
//! reasoner wants: wall-clock first, then the conversation's tool-call cap,
//! then the per-turn iteration cap. [`TelemetryEngine`] keeps span-based
//! traces of every turn (reasoning calls, tool executions, interrupts).

pub mod engine;
pub mod guard;
pub mod model;

pub use engine::TelemetryEngine;
pub use guard::{ActionCheck, BudgetGuard, IterationCheck};
pub use model::{Span, SpanKind, Trace, UsageSnapshot};

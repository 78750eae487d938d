//! # Waypoint Core
//!
//! Domain types, traits, and error definitions for the Waypoint tool-use
//! execution core. This crate has **no framework dependencies**: it defines the
//! model every other crate implements against.
//!
//! ## Design Philosophy
//!
//! Collaborators (LLM providers, tools, checkpoint stores) are traits here.
//! Implementations live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/mock implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod action;
pub mod budget;
pub mod checkpoint;
pub mod error;
pub mod event;
pub mod interrupt;
pub mod message;
pub mod provider;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{ActionRequest, Decision, Observation, ObservationStatus, signature_of};
pub use budget::{BudgetExceeded, Budgets};
pub use checkpoint::{CheckpointStore, CheckpointSummary};
pub use error::{CheckpointError, Error, InterruptOutstanding, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use interrupt::{
    Candidate, InterruptKind, InterruptPayload, InterruptRequest, ParamPrompt, ResumeToken,
    ResumeValue,
};
pub use message::{ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use state::{ConversationState, PendingInterrupt, RunNode, TurnClock};
pub use tool::{Tool, ToolRegistry, ToolResult};

//! Domain event system: process-wide notifications about runs.
//!
//! The run controller publishes these as it moves through a turn. Anything
//! that wants to observe runs across all conversations (logs, dashboards)
//! subscribes without coupling to the controller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::budget::BudgetExceeded;
use crate::interrupt::InterruptKind;
use crate::action::ObservationStatus;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A user turn entered the reasoning node
    TurnStarted {
        conversation_id: String,
        turn: u32,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked (or an action was cancelled)
    ToolExecuted {
        conversation_id: String,
        tool_name: String,
        status: ObservationStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An action was dropped as a repeat of an earlier one
    DuplicateSkipped {
        conversation_id: String,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A run suspended for human input
    InterruptRaised {
        conversation_id: String,
        kind: InterruptKind,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// A suspended run was resumed
    InterruptResolved {
        conversation_id: String,
        kind: InterruptKind,
        cancelled: bool,
        timestamp: DateTime<Utc>,
    },

    /// A budget stopped the turn
    BudgetExhausted {
        conversation_id: String,
        reason: BudgetExceeded,
        timestamp: DateTime<Utc>,
    },

    /// The turn produced its final message
    TurnCompleted {
        conversation_id: String,
        iteration_count: u32,
        total_tool_calls: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

//! Conversation state: the unit persisted in a checkpoint.
//!
//! A `ConversationState` holds everything needed to continue a run in a
//! different process: the history, the counters, the decision being
//! executed, where in it execution stands, and (while suspended) the parked
//! interrupt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::action::{ActionRequest, Decision, Observation};
use crate::budget::BudgetExceeded;
use crate::error::InterruptOutstanding;
use crate::interrupt::InterruptRequest;
use crate::message::{ConversationId, Message, Role};

/// The run controller node to enter when the state is next driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunNode {
    Reasoning,
    Executing,
    Suspended,
    Done,
}

impl RunNode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reasoning => "reasoning",
            Self::Executing => "executing",
            Self::Suspended => "suspended",
            Self::Done => "done",
        }
    }
}

/// Active processing time of the current turn.
///
/// Time spent suspended waiting for a human does not count: the clock is
/// paused when a run parks an interrupt and restarted on resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnClock {
    /// Milliseconds accumulated by finished segments
    pub active_ms: u64,

    /// Start of the running segment, if the clock is running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_started_at: Option<DateTime<Utc>>,
}

impl TurnClock {
    /// Reset and start the clock for a new turn.
    pub fn start(&mut self) {
        self.active_ms = 0;
        self.segment_started_at = Some(Utc::now());
    }

    pub fn pause(&mut self) {
        if let Some(started) = self.segment_started_at.take() {
            let segment = (Utc::now() - started).num_milliseconds().max(0) as u64;
            self.active_ms = self.active_ms.saturating_add(segment);
        }
    }

    pub fn resume(&mut self) {
        if self.segment_started_at.is_none() {
            self.segment_started_at = Some(Utc::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        let running = self
            .segment_started_at
            .map(|started| (Utc::now() - started).num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        Duration::from_millis(self.active_ms.saturating_add(running))
    }
}

/// A suspended action and the interrupt it raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInterrupt {
    pub request: InterruptRequest,

    /// The action with the arguments it currently has
    pub action: ActionRequest,
}

/// Everything the run controller persists for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: ConversationId,

    /// Append-only history
    pub messages: Vec<Message>,

    /// Action-yielding reasoning iterations this turn
    pub iteration_count: u32,

    /// Real tool invocations over the conversation's lifetime
    pub total_tool_calls: u32,

    /// Set when a budget stopped the turn
    #[serde(default)]
    pub force_terminate: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<BudgetExceeded>,

    /// The decision currently being executed (or the final one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,

    /// Observations produced while executing `decision`
    #[serde(default)]
    pub observations: Vec<Observation>,

    /// Index of the next action of `decision` to process
    #[serde(default)]
    pub cursor: usize,

    pub node: RunNode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_interrupt: Option<PendingInterrupt>,

    #[serde(default)]
    pub clock: TurnClock,

    /// Number of user turns seen
    #[serde(default)]
    pub turns: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Fresh state for a conversation that has not started yet.
    pub fn new(conversation_id: ConversationId) -> Self {
        let now = Utc::now();
        Self {
            conversation_id,
            messages: Vec::new(),
            iteration_count: 0,
            total_tool_calls: 0,
            force_terminate: false,
            stop_reason: None,
            decision: None,
            observations: Vec::new(),
            cursor: 0,
            node: RunNode::Done,
            pending_interrupt: None,
            clock: TurnClock::default(),
            turns: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message to the history.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Enter a new user turn: record the message and reset per-turn state.
    ///
    /// `total_tool_calls` always carries over; `iteration_count` only when
    /// `reset_iterations` is false.
    pub fn begin_turn(&mut self, user_message: impl Into<String>, reset_iterations: bool) {
        self.push(Message::user(user_message));
        if reset_iterations {
            self.iteration_count = 0;
        }
        self.turns += 1;
        self.force_terminate = false;
        self.stop_reason = None;
        self.decision = None;
        self.observations.clear();
        self.cursor = 0;
        self.node = RunNode::Reasoning;
        self.clock.start();
    }

    /// Install a new decision to execute; clears the previous pass.
    pub fn install_decision(&mut self, decision: Decision) {
        self.observations.clear();
        self.cursor = 0;
        self.decision = Some(decision);
    }

    /// The action the executor should process next, if any.
    pub fn current_action(&self) -> Option<&ActionRequest> {
        self.decision.as_ref()?.actions().get(self.cursor)
    }

    /// Whether actions of the current decision remain unprocessed.
    pub fn has_pending_actions(&self) -> bool {
        self.current_action().is_some()
    }

    /// Move past the current action.
    pub fn advance(&mut self) {
        self.cursor += 1;
        self.updated_at = Utc::now();
    }

    /// Record an observation for the current pass and append it to history.
    pub fn record_observation(&mut self, observation: Observation) {
        self.observations.push(observation.clone());
        self.push(Message::tool_result(observation));
    }

    /// Park an interrupt. Fails if one is already outstanding.
    pub fn park_interrupt(&mut self, pending: PendingInterrupt) -> Result<(), InterruptOutstanding> {
        if let Some(existing) = &self.pending_interrupt {
            return Err(InterruptOutstanding {
                kind: existing.request.kind.to_string(),
                call_id: existing.request.call_id.clone(),
            });
        }
        self.pending_interrupt = Some(pending);
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn take_interrupt(&mut self) -> Option<PendingInterrupt> {
        self.pending_interrupt.take()
    }

    /// Observations recorded anywhere in the history, oldest first.
    pub fn history_observations(&self) -> impl Iterator<Item = &Observation> {
        self.messages.iter().filter_map(|m| m.observation.as_ref())
    }

    /// Observations recorded since the latest user message, oldest first.
    pub fn turn_observations(&self) -> impl Iterator<Item = &Observation> {
        let start = self
            .messages
            .iter()
            .rposition(|m| m.role == Role::User)
            .map_or(0, |i| i + 1);
        self.messages[start..].iter().filter_map(|m| m.observation.as_ref())
    }

    /// The most recent user message, if any.
    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

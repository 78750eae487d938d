//! Executor: carries out exactly one action of the current decision per
//! call.
//!
//! For the action under the cursor it checks, in order: duplicate → gate 1
//! (missing parameters) → gate 2 (confirmation) → budget → tool invocation →
//! gate 3 (selection). Whatever happens, control goes back to the run
//! controller right after, so every step is persisted before the next one.
//!
//! Tool failures of any kind become `error` observations. Nothing raised by
//! a tool leaves this module.

use std::sync::Arc;
use std::time::{Duration, Instant};

use waypoint_core::{
    ActionRequest, BudgetExceeded, ConversationState, InterruptKind, InterruptOutstanding,
    InterruptRequest, Observation, PendingInterrupt, Role, ToolRegistry,
};
use waypoint_telemetry::{ActionCheck, BudgetGuard};

use crate::dedup::DedupTracker;
use crate::interrupt::{InterruptController, ResumeOutcome};

/// The result of one executor step.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The action finished (success, error or cancelled) and was recorded.
    Observed {
        observation: Observation,
        duration: Duration,
    },
    /// The action repeated an earlier one and was dropped.
    Skipped { call_id: String, tool_name: String },
    /// The action is parked behind an interrupt.
    Suspended(InterruptRequest),
    /// A budget refused the tool call; the action was not run.
    Denied(BudgetExceeded),
    /// No action was pending.
    Idle,
}

pub struct Executor {
    tools: Arc<ToolRegistry>,
    dedup: DedupTracker,
    interrupts: Arc<InterruptController>,
    guard: BudgetGuard,
}

impl Executor {
    pub fn new(tools: Arc<ToolRegistry>, interrupts: Arc<InterruptController>, guard: BudgetGuard) -> Self {
        Self {
            tools,
            dedup: DedupTracker::new(),
            interrupts,
            guard,
        }
    }

    /// Process the action under the cursor.
    pub async fn step(&self, state: &mut ConversationState) -> Result<StepOutcome, InterruptOutstanding> {
        let Some(action) = state.current_action().cloned() else {
            return Ok(StepOutcome::Idle);
        };
        self.gate_and_run(state, action).await
    }

    /// Continue the parked action with an already-validated resume outcome.
    ///
    /// `pending` must have been taken off `state` by the caller.
    pub async fn resume(
        &self,
        state: &mut ConversationState,
        pending: PendingInterrupt,
        outcome: ResumeOutcome,
    ) -> Result<StepOutcome, InterruptOutstanding> {
        let PendingInterrupt { request, action } = pending;
        match outcome {
            ResumeOutcome::Cancelled => {
                tracing::info!(
                    conversation_id = %state.conversation_id,
                    tool = %action.tool_name,
                    call_id = %action.call_id,
                    "Action cancelled by user"
                );
                Ok(self.record(state, Observation::cancelled(&action), Duration::ZERO))
            }
            ResumeOutcome::Selected(candidate) => {
                let payload = serde_json::to_string(&candidate).unwrap_or_else(|_| candidate.name.clone());
                Ok(self.record(state, Observation::success(&action, payload), Duration::ZERO))
            }
            ResumeOutcome::Proceed(patched) if request.kind == InterruptKind::AskParams => {
                // The merged call may now repeat an earlier one or still lack fields.
                apply_patch(state, &patched);
                self.gate_and_run(state, patched).await
            }
            ResumeOutcome::Proceed(confirmed) => self.run(state, confirmed).await,
        }
    }

    async fn gate_and_run(
        &self,
        state: &mut ConversationState,
        action: ActionRequest,
    ) -> Result<StepOutcome, InterruptOutstanding> {
        if self.dedup.is_duplicate(state, &action) {
            tracing::info!(
                conversation_id = %state.conversation_id,
                tool = %action.tool_name,
                call_id = %action.call_id,
                "Duplicate action skipped"
            );
            state.advance();
            return Ok(StepOutcome::Skipped {
                call_id: action.call_id,
                tool_name: action.tool_name,
            });
        }

        if let Some(request) = self
            .interrupts
            .check_missing(&action)
            .or_else(|| self.interrupts.check_confirmation(&action))
        {
            return self.suspend(state, request, action);
        }

        self.run(state, action).await
    }

    /// Budget check, invocation, then the selection gate.
    async fn run(
        &self,
        state: &mut ConversationState,
        action: ActionRequest,
    ) -> Result<StepOutcome, InterruptOutstanding> {
        if let ActionCheck::Deny(reason) = self.guard.check_before_action(state) {
            tracing::warn!(
                conversation_id = %state.conversation_id,
                tool = %action.tool_name,
                budget = reason.as_str(),
                "Tool call denied by budget"
            );
            return Ok(StepOutcome::Denied(reason));
        }

        let started = Instant::now();
        let result = self
            .tools
            .invoke(&action.tool_name, action.args_value(), self.guard.budgets().tool_timeout)
            .await;
        self.guard.record_tool_call(state);
        let duration = started.elapsed();

        let observation = match result {
            Ok(result) if result.success => {
                if let Some(request) = self.interrupts.check_selection(&action, &result) {
                    return self.suspend(state, request, action);
                }
                Observation::success(&action, result.output)
            }
            Ok(result) => {
                tracing::warn!(tool = %action.tool_name, call_id = %action.call_id, "Tool reported failure");
                Observation::failure(&action, result.output)
            }
            Err(e) => {
                tracing::warn!(tool = %action.tool_name, call_id = %action.call_id, error = %e, "Tool invocation failed");
                Observation::failure(&action, e.to_string())
            }
        };

        tracing::debug!(
            tool = %action.tool_name,
            status = observation.status.as_str(),
            duration_ms = duration.as_millis() as u64,
            total_tool_calls = state.total_tool_calls,
            "Tool executed"
        );
        Ok(self.record(state, observation, duration))
    }

    fn record(&self, state: &mut ConversationState, observation: Observation, duration: Duration) -> StepOutcome {
        state.record_observation(observation.clone());
        state.advance();
        StepOutcome::Observed {
            observation,
            duration,
        }
    }

    fn suspend(
        &self,
        state: &mut ConversationState,
        request: InterruptRequest,
        action: ActionRequest,
    ) -> Result<StepOutcome, InterruptOutstanding> {
        state.park_interrupt(PendingInterrupt {
            request: request.clone(),
            action,
        })?;
        Ok(StepOutcome::Suspended(request))
    }
}

/// Write patched arguments back into the decision and into the assistant
/// message that announced the call, so history shows what actually ran.
fn apply_patch(state: &mut ConversationState, patched: &ActionRequest) {
    let cursor = state.cursor;
    if let Some(action) = state.decision.as_mut().and_then(|d| d.action_mut(cursor)) {
        if action.call_id == patched.call_id {
            action.args = patched.args.clone();
        }
    }

    let arguments = patched.args_value().to_string();
    if let Some(call) = state
        .messages
        .iter_mut()
        .rev()
        .filter(|m| m.role == Role::Assistant)
        .flat_map(|m| m.tool_calls.iter_mut())
        .find(|call| call.id == patched.call_id)
    {
        call.arguments = arguments;
    }
}

//! Duplicate action detection.
//!
//! An action is a duplicate when its signature (tool name plus canonical
//! arguments) matches an observation recorded earlier in the same user turn
//! that was not cancelled. Cancelled actions may be asked for again, and a
//! later turn may repeat any call: replay only ever happens inside a turn.

use std::collections::HashSet;
use waypoint_core::{ActionRequest, ConversationState, ObservationStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct DedupTracker;

impl DedupTracker {
    pub fn new() -> Self {
        Self
    }

    /// Signatures of every non-cancelled observation of the current turn.
    pub fn executed_signatures(&self, state: &ConversationState) -> HashSet<String> {
        state
            .turn_observations()
            .filter(|obs| obs.status != ObservationStatus::Cancelled)
            .map(|obs| obs.signature.clone())
            .collect()
    }

    pub fn is_duplicate(&self, state: &ConversationState, action: &ActionRequest) -> bool {
        let signature = action.signature();
        state
            .turn_observations()
            .any(|obs| obs.status != ObservationStatus::Cancelled && obs.signature == signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use waypoint_core::{ConversationId, Observation};

    fn state_with(observations: Vec<Observation>) -> ConversationState {
        let mut state = ConversationState::new(ConversationId::from("c"));
        state.begin_turn("hi", true);
        for obs in observations {
            state.record_observation(obs);
        }
        state
    }

    #[test]
    fn completed_action_is_duplicate_regardless_of_call_id_and_key_order() {
        let first = ActionRequest::new("c1", "book_ticket", json!({"train_no": "G1", "date": "2025-05-01"}));
        let state = state_with(vec![Observation::success(&first, "booked")]);

        let replay = ActionRequest::new("c9", "book_ticket", json!({"date": "2025-05-01", "train_no": "G1"}));
        assert!(DedupTracker.is_duplicate(&state, &replay));
    }

    #[test]
    fn failed_action_counts_as_executed() {
        let first = ActionRequest::new("c1", "get_weather", json!({"city": "Oslo"}));
        let state = state_with(vec![Observation::failure(&first, "upstream down")]);
        assert!(DedupTracker.is_duplicate(&state, &first));
    }

    #[test]
    fn cancelled_action_is_not_duplicate() {
        let first = ActionRequest::new("c1", "set_destination", json!({"poi_name": "Central Park"}));
        let state = state_with(vec![Observation::cancelled(&first)]);
        assert!(!DedupTracker.is_duplicate(&state, &first));
        assert!(DedupTracker.executed_signatures(&state).is_empty());
    }

    #[test]
    fn different_arguments_are_not_duplicates() {
        let first = ActionRequest::new("c1", "get_weather", json!({"city": "Oslo"}));
        let state = state_with(vec![Observation::success(&first, "rain")]);
        let other = ActionRequest::new("c2", "get_weather", json!({"city": "Bergen"}));
        assert!(!DedupTracker.is_duplicate(&state, &other));
    }

    #[test]
    fn earlier_turns_do_not_block_a_repeat() {
        let weather = ActionRequest::new("c1", "get_weather", json!({"city": "Oslo"}));
        let mut state = state_with(vec![Observation::success(&weather, "rain")]);
        assert!(DedupTracker.is_duplicate(&state, &weather));

        state.begin_turn("and now?", true);
        assert!(!DedupTracker.is_duplicate(&state, &weather));

        state.record_observation(Observation::success(&weather, "sun"));
        assert!(DedupTracker.is_duplicate(&state, &weather));
    }
}

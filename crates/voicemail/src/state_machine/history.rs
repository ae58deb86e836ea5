//! Transition history of a session

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::SessionState;

/// One state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRecord {
    /// Position of this transition within the session, starting at 0
    pub sequence: u64,
    pub from_state: SessionState,
    pub to_state: SessionState,
    pub timestamp: DateTime<Utc>,
}

/// Everything a finished session reports back to its handle
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionHistory {
    pub transitions: Vec<TransitionRecord>,
    /// Whether the session asked the channel to hang up
    pub hangup_requested: bool,
    /// Whether the channel was known to be gone when the session ended
    pub hung_up: bool,
}

impl SessionHistory {
    pub(crate) fn record(&mut self, from_state: SessionState, to_state: SessionState) {
        let sequence = self.transitions.len() as u64;
        self.transitions.push(TransitionRecord {
            sequence,
            from_state,
            to_state,
            timestamp: Utc::now(),
        });
    }

    /// States in the order they were entered, starting with `init`
    pub fn visited_states(&self) -> Vec<SessionState> {
        let mut states = vec![SessionState::Init];
        states.extend(self.transitions.iter().map(|t| t.to_state));
        states
    }

    pub fn final_state(&self) -> SessionState {
        self.transitions
            .last()
            .map(|t| t.to_state)
            .unwrap_or(SessionState::Init)
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }
}

//! Lifecycle state machine for the scheduler.
//!
//! The scheduler moves through a small, reusable lifecycle:
//! IDLE → RUNNING → STOPPED, with STOPPED → RUNNING allowed so a
//! stopped scheduler can be restarted with its registered tasks intact.

use crate::error::{SchedError, SchedResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a scheduler instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedState {
    /// Constructed, no dispatch threads running. Tasks may be registered.
    #[default]
    Idle,
    /// Dispatch threads are live; registration is rejected.
    Running,
    /// Dispatch threads have been joined; may be restarted.
    Stopped,
}

impl fmt::Display for SchedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Running => write!(f, "RUNNING"),
            Self::Stopped => write!(f, "STOPPED"),
        }
    }
}

impl SchedState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: SchedState) -> bool {
        use SchedState::{Idle, Running, Stopped};

        matches!(
            (self, target),
            // First start
            (Idle, Running)
                // Cooperative shutdown
                | (Running, Stopped)
                // Restart after a stop
                | (Stopped, Running)
        )
    }

    /// Attempt to transition to `target`, returning an error if invalid.
    pub fn transition_to(&mut self, target: SchedState) -> SchedResult<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(SchedError::InvalidState(format!(
                "cannot transition from {self} to {target}"
            )))
        }
    }

    /// Returns true if dispatch threads are live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

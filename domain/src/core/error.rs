//! Domain error types

use crate::supervisor::state::SupervisorState;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: SupervisorState,
        to: SupervisorState,
    },

    #[error("Cannot resume: supervisor is not paused (current state: {0})")]
    NotPaused(SupervisorState),

    #[error("Cannot resume: no paused-from state recorded in history")]
    MissingPausedFrom,

    #[error("No active task")]
    NoActiveTask,
}

impl DomainError {
    /// Check if this error is a rejected transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DomainError::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            from: SupervisorState::Idle,
            to: SupervisorState::Verify,
        };
        assert_eq!(error.to_string(), "Invalid state transition: IDLE -> VERIFY");
    }

    #[test]
    fn test_is_invalid_transition_check() {
        assert!(
            DomainError::InvalidTransition {
                from: SupervisorState::Complete,
                to: SupervisorState::Failed,
            }
            .is_invalid_transition()
        );
        assert!(!DomainError::MissingPausedFrom.is_invalid_transition());
        assert!(!DomainError::NoActiveTask.is_invalid_transition());
    }
}

//! Supervisor states of the Ralph Loop.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// State of the supervisor for the single in-flight task.
///
/// `Complete` and `Failed` are terminal. `Paused` remembers the state it was
/// entered from through the transition history (see
/// [`TransitionContext::paused_from`](super::entities::TransitionContext)).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupervisorState {
    /// No task loaded
    Idle,
    /// Producing a plan for the task
    Plan,
    /// Executing the plan steps
    Execute,
    /// Checking the execution against the success criteria
    Verify,
    /// Verification failed; about to re-enter execution
    Iterate,
    /// Task verified complete
    Complete,
    /// Task failed (handler error, timeout, budget exhausted or abort)
    Failed,
    /// Suspended until resumed
    Paused,
}

impl SupervisorState {
    /// Every state, in declaration order.
    pub const ALL: [SupervisorState; 8] = [
        SupervisorState::Idle,
        SupervisorState::Plan,
        SupervisorState::Execute,
        SupervisorState::Verify,
        SupervisorState::Iterate,
        SupervisorState::Complete,
        SupervisorState::Failed,
        SupervisorState::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "IDLE",
            SupervisorState::Plan => "PLAN",
            SupervisorState::Execute => "EXECUTE",
            SupervisorState::Verify => "VERIFY",
            SupervisorState::Iterate => "ITERATE",
            SupervisorState::Complete => "COMPLETE",
            SupervisorState::Failed => "FAILED",
            SupervisorState::Paused => "PAUSED",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "Idle",
            SupervisorState::Plan => "Planning",
            SupervisorState::Execute => "Executing",
            SupervisorState::Verify => "Verifying",
            SupervisorState::Iterate => "Iterating",
            SupervisorState::Complete => "Complete",
            SupervisorState::Failed => "Failed",
            SupervisorState::Paused => "Paused",
        }
    }

    /// `Complete` and `Failed` have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Complete | SupervisorState::Failed)
    }

    /// States in which a phase of work is in progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SupervisorState::Plan
                | SupervisorState::Execute
                | SupervisorState::Verify
                | SupervisorState::Iterate
        )
    }

    /// Fixed progress percentage reported for this state.
    ///
    /// `Paused` has no percentage of its own; callers report the percentage
    /// of the state it was paused from.
    pub fn progress_percentage(&self) -> Option<u8> {
        match self {
            SupervisorState::Idle => Some(0),
            SupervisorState::Plan => Some(20),
            SupervisorState::Execute => Some(50),
            SupervisorState::Verify => Some(80),
            SupervisorState::Iterate => Some(40),
            SupervisorState::Complete | SupervisorState::Failed => Some(100),
            SupervisorState::Paused => None,
        }
    }
}

impl std::fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SupervisorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SupervisorState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown supervisor state: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(SupervisorState::Complete.is_terminal());
        assert!(SupervisorState::Failed.is_terminal());
        assert!(!SupervisorState::Paused.is_terminal());
        assert!(!SupervisorState::Idle.is_terminal());
    }

    #[test]
    fn test_active_states() {
        assert!(SupervisorState::Plan.is_active());
        assert!(SupervisorState::Iterate.is_active());
        assert!(!SupervisorState::Idle.is_active());
        assert!(!SupervisorState::Paused.is_active());
        assert!(!SupervisorState::Complete.is_active());
    }

    #[test]
    fn test_progress_percentages() {
        assert_eq!(SupervisorState::Idle.progress_percentage(), Some(0));
        assert_eq!(SupervisorState::Plan.progress_percentage(), Some(20));
        assert_eq!(SupervisorState::Iterate.progress_percentage(), Some(40));
        assert_eq!(SupervisorState::Execute.progress_percentage(), Some(50));
        assert_eq!(SupervisorState::Verify.progress_percentage(), Some(80));
        assert_eq!(SupervisorState::Failed.progress_percentage(), Some(100));
        assert_eq!(SupervisorState::Paused.progress_percentage(), None);
    }

    #[test]
    fn test_parse_and_serde_names() {
        assert_eq!("verify".parse::<SupervisorState>(), Ok(SupervisorState::Verify));
        assert!("sleeping".parse::<SupervisorState>().is_err());

        let json = serde_json::to_string(&SupervisorState::Iterate).unwrap();
        assert_eq!(json, "\"ITERATE\"");
    }
}

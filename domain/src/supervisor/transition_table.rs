//! Static transition table for the supervisor.
//!
//! | From      | Legal targets                              | Pausable |
//! |-----------|--------------------------------------------|----------|
//! | IDLE      | PLAN                                       | no       |
//! | PLAN      | EXECUTE, FAILED, PAUSED                    | yes      |
//! | EXECUTE   | VERIFY, FAILED, PAUSED                     | yes      |
//! | VERIFY    | COMPLETE, ITERATE, FAILED, PAUSED          | yes      |
//! | ITERATE   | EXECUTE, FAILED, PAUSED                    | yes      |
//! | PAUSED    | PLAN, EXECUTE, VERIFY, ITERATE, FAILED     | no       |
//! | COMPLETE  | -                                          | no       |
//! | FAILED    | -                                          | no       |
//!
//! Leaving `PAUSED` for an active state is further restricted to the state
//! recorded at pause time; that check belongs to the state machine because
//! it needs the history.

use super::state::SupervisorState;

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// States reachable from this one
    pub targets: &'static [SupervisorState],
    /// Whether `pause` is legal from this state
    pub pausable: bool,
}

const IDLE: TransitionRule = TransitionRule {
    targets: &[SupervisorState::Plan],
    pausable: false,
};

const PLAN: TransitionRule = TransitionRule {
    targets: &[
        SupervisorState::Execute,
        SupervisorState::Failed,
        SupervisorState::Paused,
    ],
    pausable: true,
};

const EXECUTE: TransitionRule = TransitionRule {
    targets: &[
        SupervisorState::Verify,
        SupervisorState::Failed,
        SupervisorState::Paused,
    ],
    pausable: true,
};

const VERIFY: TransitionRule = TransitionRule {
    targets: &[
        SupervisorState::Complete,
        SupervisorState::Iterate,
        SupervisorState::Failed,
        SupervisorState::Paused,
    ],
    pausable: true,
};

const ITERATE: TransitionRule = TransitionRule {
    targets: &[
        SupervisorState::Execute,
        SupervisorState::Failed,
        SupervisorState::Paused,
    ],
    pausable: true,
};

const PAUSED: TransitionRule = TransitionRule {
    targets: &[
        SupervisorState::Plan,
        SupervisorState::Execute,
        SupervisorState::Verify,
        SupervisorState::Iterate,
        SupervisorState::Failed,
    ],
    pausable: false,
};

const TERMINAL: TransitionRule = TransitionRule {
    targets: &[],
    pausable: false,
};

/// Look up the table row for `state`.
pub fn rule(state: SupervisorState) -> TransitionRule {
    match state {
        SupervisorState::Idle => IDLE,
        SupervisorState::Plan => PLAN,
        SupervisorState::Execute => EXECUTE,
        SupervisorState::Verify => VERIFY,
        SupervisorState::Iterate => ITERATE,
        SupervisorState::Paused => PAUSED,
        SupervisorState::Complete | SupervisorState::Failed => TERMINAL,
    }
}

/// States reachable from `state`.
pub fn allowed_targets(state: SupervisorState) -> &'static [SupervisorState] {
    rule(state).targets
}

/// Whether the table contains the edge `from -> to`.
pub fn can_transition(from: SupervisorState, to: SupervisorState) -> bool {
    allowed_targets(from).contains(&to)
}

/// Whether `pause` is legal from `state`.
pub fn is_pausable(state: SupervisorState) -> bool {
    rule(state).pausable
}

/// A state is terminal when it has no outgoing edges.
pub fn is_terminal(state: SupervisorState) -> bool {
    allowed_targets(state).is_empty()
}

/// The state a phase normally advances to on success.
///
/// `PLAN -> EXECUTE -> VERIFY -> COMPLETE`, and `ITERATE -> EXECUTE`.
pub fn normal_successor(state: SupervisorState) -> Option<SupervisorState> {
    match state {
        SupervisorState::Idle => Some(SupervisorState::Plan),
        SupervisorState::Plan => Some(SupervisorState::Execute),
        SupervisorState::Execute => Some(SupervisorState::Verify),
        SupervisorState::Verify => Some(SupervisorState::Complete),
        SupervisorState::Iterate => Some(SupervisorState::Execute),
        SupervisorState::Complete | SupervisorState::Failed | SupervisorState::Paused => None,
    }
}

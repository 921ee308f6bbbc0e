//! State machine parameters: iteration budget and per-state timeouts.

use ralph_domain::SupervisorState;
use std::collections::HashMap;
use std::time::Duration;

/// Parameters owned by the [`StateMachine`](crate::state_machine::StateMachine).
///
/// A state without an entry in `timeouts` never times out.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMachineConfig {
    /// Iteration budget copied onto every new task.
    pub max_iterations: u32,
    /// How long the machine may stay in a state before failing the task.
    pub timeouts: HashMap<SupervisorState, Duration>,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeouts: HashMap::new(),
        }
    }
}

impl StateMachineConfig {
    // ==================== Builder Methods ====================

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_timeout(mut self, state: SupervisorState, timeout: Duration) -> Self {
        self.timeouts.insert(state, timeout);
        self
    }

    pub fn timeout_for(&self, state: SupervisorState) -> Option<Duration> {
        self.timeouts.get(&state).copied()
    }
}

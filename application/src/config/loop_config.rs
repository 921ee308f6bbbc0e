//! Supervisor loop parameters: timers, auto-persistence and recovery.

use super::state_machine_config::StateMachineConfig;
use std::time::Duration;

/// Loop control parameters for
/// [`SupervisorLoop`](crate::use_cases::run_supervisor::SupervisorLoop).
///
/// | Field               | Default | Meaning |
/// |---------------------|---------|---------|
/// | `progress_interval` | 5s      | Periodic progress report; `None` disables |
/// | `auto_persist`      | true    | Save a snapshot on every transition |
/// | `persist_interval`  | `None`  | Additional periodic snapshot |
/// | `max_recovery_age`  | 24h     | Older snapshots are stale |
/// | `auto_recover`      | false   | `run(task)` resumes a snapshot for the same task |
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub machine: StateMachineConfig,
    pub progress_interval: Option<Duration>,
    pub auto_persist: bool,
    pub persist_interval: Option<Duration>,
    pub max_recovery_age: Duration,
    pub auto_recover: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            machine: StateMachineConfig::default(),
            progress_interval: Some(Duration::from_secs(5)),
            auto_persist: true,
            persist_interval: None,
            max_recovery_age: Duration::from_secs(24 * 60 * 60),
            auto_recover: false,
        }
    }
}

impl LoopConfig {
    // ==================== Builder Methods ====================

    pub fn with_machine(mut self, machine: StateMachineConfig) -> Self {
        self.machine = machine;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.machine.max_iterations = max;
        self
    }

    pub fn with_progress_interval(mut self, interval: Option<Duration>) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_auto_persist(mut self, enabled: bool) -> Self {
        self.auto_persist = enabled;
        self
    }

    pub fn with_persist_interval(mut self, interval: Option<Duration>) -> Self {
        self.persist_interval = interval;
        self
    }

    pub fn with_max_recovery_age(mut self, age: Duration) -> Self {
        self.max_recovery_age = age;
        self
    }

    pub fn with_auto_recover(mut self, enabled: bool) -> Self {
        self.auto_recover = enabled;
        self
    }
}

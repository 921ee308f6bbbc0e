//! Supervisor loop configuration from TOML (`[supervisor]` section)

use crate::persistence::DEFAULT_STATE_FILE;
use ralph_application::{LoopConfig, StateMachineConfig};
use ralph_domain::SupervisorState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Raw per-state timeouts in seconds (`[supervisor.timeouts]`)
///
/// ```toml
/// [supervisor.timeouts]
/// plan = 300
/// execute = 1800
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTimeoutsConfig {
    pub plan: Option<u64>,
    pub execute: Option<u64>,
    pub verify: Option<u64>,
    pub iterate: Option<u64>,
    pub paused: Option<u64>,
}

impl FileTimeoutsConfig {
    /// Configured timeouts paired with the state they apply to.
    pub fn entries(&self) -> Vec<(SupervisorState, u64)> {
        [
            (SupervisorState::Plan, self.plan),
            (SupervisorState::Execute, self.execute),
            (SupervisorState::Verify, self.verify),
            (SupervisorState::Iterate, self.iterate),
            (SupervisorState::Paused, self.paused),
        ]
        .into_iter()
        .filter_map(|(state, secs)| secs.map(|secs| (state, secs)))
        .collect()
    }
}

/// Raw supervisor configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSupervisorConfig {
    /// Iteration budget per task
    pub max_iterations: u32,
    /// Progress report period in milliseconds (0 disables periodic reports)
    pub progress_interval_ms: u64,
    /// Snapshot after every transition
    pub auto_persist: bool,
    /// Periodic snapshot interval in milliseconds (0 disables)
    pub persist_interval_ms: u64,
    /// Snapshots older than this are not offered for recovery
    pub max_recovery_age_hours: u64,
    /// Resume a matching snapshot automatically on `run`
    pub auto_recover: bool,
    /// Snapshot file location
    pub state_file: PathBuf,
    pub timeouts: FileTimeoutsConfig,
}

impl Default for FileSupervisorConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            progress_interval_ms: 5000,
            auto_persist: true,
            persist_interval_ms: 0,
            max_recovery_age_hours: 24,
            auto_recover: false,
            state_file: PathBuf::from(DEFAULT_STATE_FILE),
            timeouts: FileTimeoutsConfig::default(),
        }
    }
}

fn non_zero_millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl FileSupervisorConfig {
    pub fn to_state_machine_config(&self) -> StateMachineConfig {
        self.timeouts.entries().into_iter().fold(
            StateMachineConfig::default().with_max_iterations(self.max_iterations),
            |config, (state, secs)| config.with_timeout(state, Duration::from_secs(secs)),
        )
    }

    pub fn to_loop_config(&self) -> LoopConfig {
        LoopConfig::default()
            .with_machine(self.to_state_machine_config())
            .with_progress_interval(non_zero_millis(self.progress_interval_ms))
            .with_auto_persist(self.auto_persist)
            .with_persist_interval(non_zero_millis(self.persist_interval_ms))
            .with_max_recovery_age(Duration::from_secs(self.max_recovery_age_hours * 3600))
            .with_auto_recover(self.auto_recover)
    }
}

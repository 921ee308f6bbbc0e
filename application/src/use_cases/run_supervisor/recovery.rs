//! Crash recovery: inspecting, restoring and discarding a persisted snapshot.

use super::SupervisorLoop;
use super::types::LoopError;
use chrono::{DateTime, Utc};
use ralph_domain::{PersistedState, SupervisorState, TaskId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{info, warn};

/// What a persisted snapshot says about a previous run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryInfo {
    pub task_id: TaskId,
    pub description: String,
    pub state: SupervisorState,
    pub iteration: u32,
    pub max_iterations: u32,
    pub persisted_at: DateTime<Utc>,
    pub age_ms: u64,
    /// Older than the configured maximum recovery age
    pub stale: bool,
    /// Non-terminal and not stale
    pub resumable: bool,
}

impl RecoveryInfo {
    pub fn from_snapshot(snapshot: &PersistedState, max_age: Duration) -> Self {
        let age = snapshot.age();
        let stale = age > max_age;
        Self {
            task_id: snapshot.task_context.id.clone(),
            description: snapshot.task_context.description.clone(),
            state: snapshot.current_state,
            iteration: snapshot.task_context.iteration,
            max_iterations: snapshot.task_context.max_iterations,
            persisted_at: snapshot.persisted_at,
            age_ms: u64::try_from(age.as_millis()).unwrap_or(u64::MAX),
            stale,
            resumable: !stale && !snapshot.current_state.is_terminal(),
        }
    }

    pub fn age(&self) -> Duration {
        Duration::from_millis(self.age_ms)
    }

    /// One-sentence description for the user.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "A previous task for \"{}\" was left in state {} {} ago (iteration {}/{})",
            self.description,
            self.state,
            format_age(self.age()),
            self.iteration,
            self.max_iterations
        );
        if self.stale {
            summary.push_str("; it is too old to resume");
        } else if !self.resumable {
            summary.push_str("; it has already finished");
        }
        summary
    }
}

fn format_age(age: Duration) -> String {
    let minutes = age.as_secs() / 60;
    match minutes {
        0 => "less than a minute".to_string(),
        1 => "1 minute".to_string(),
        m if m < 120 => format!("{} minutes", m),
        m if m < 48 * 60 => format!("{} hours", m / 60),
        m => format!("{} days", m / (24 * 60)),
    }
}

impl SupervisorLoop {
    /// Whether a resumable snapshot exists.
    pub fn has_recoverable_state(&self) -> bool {
        self.recovery_info().is_some_and(|info| info.resumable)
    }

    /// Describe the persisted snapshot, resumable or not.
    pub fn recovery_info(&self) -> Option<RecoveryInfo> {
        self.persistence
            .load()
            .map(|snapshot| RecoveryInfo::from_snapshot(&snapshot, self.config.max_recovery_age))
    }

    /// Restore a resumable snapshot into the state machine.
    ///
    /// The next [`run`](SupervisorLoop::run) continues the restored task.
    /// Returns `None` when there is nothing to resume.
    pub fn recover(&self) -> Result<Option<RecoveryInfo>, LoopError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }
        Ok(self.restore_resumable(|_| true))
    }

    /// Delete the persisted snapshot.
    pub fn discard_recovery(&self) -> Result<(), LoopError> {
        self.persistence.clear()?;
        info!("Persisted state discarded");
        Ok(())
    }

    pub(super) fn restore_resumable(
        &self,
        accept: impl FnOnce(&PersistedState) -> bool,
    ) -> Option<RecoveryInfo> {
        let snapshot = self.persistence.load()?;
        let info = RecoveryInfo::from_snapshot(&snapshot, self.config.max_recovery_age);
        if !info.resumable {
            if info.stale {
                warn!(task_id = %info.task_id, "Persisted state is stale; not resuming");
            }
            return None;
        }
        if !accept(&snapshot) {
            return None;
        }

        info!(
            task_id = %info.task_id,
            state = %info.state,
            iteration = info.iteration,
            "Recovering task from persisted state"
        );
        self.machine.restore_from_persisted_state(snapshot);
        if info.state == SupervisorState::Paused {
            self.gate.close();
        }
        Some(info)
    }
}

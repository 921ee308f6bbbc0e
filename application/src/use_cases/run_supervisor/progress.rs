//! Progress reporting: callback registry and report construction.

use super::types::ProgressReport;
use crate::state_machine::StateMachine;
use crate::state_machine::observers::{SubscriberList, Subscription};
use ralph_domain::SupervisorState;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::warn;

/// Called with every progress report.
pub type ProgressCallback = dyn Fn(&ProgressReport) + Send + Sync;

/// Fan-out of progress reports to registered callbacks.
///
/// A panicking callback is logged and skipped; it never reaches the loop.
#[derive(Clone)]
pub(super) struct ProgressHub {
    callbacks: Arc<SubscriberList<(), ProgressCallback>>,
}

impl ProgressHub {
    pub(super) fn new() -> Self {
        Self {
            callbacks: SubscriberList::new(),
        }
    }

    pub(super) fn subscribe(&self, callback: Arc<ProgressCallback>) -> Subscription {
        self.callbacks.add((), callback)
    }

    pub(super) fn emit(&self, report: &ProgressReport) {
        for callback in self.callbacks.matching(&()) {
            let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| callback(report)));
            if delivered.is_err() {
                warn!(state = %report.state, "Progress callback panicked");
            }
        }
    }

    /// Build a report from the machine's current state and emit it.
    pub(super) fn report(
        &self,
        machine: &StateMachine,
        started_at: Instant,
        message: impl Into<String>,
        details: Option<String>,
    ) {
        self.emit(&build_report(machine, started_at, message.into(), details));
    }
}

/// Percentage for `state`, falling back to the paused-from state while paused.
pub(super) fn percentage_for(state: SupervisorState, paused_from: Option<SupervisorState>) -> u8 {
    state
        .progress_percentage()
        .or_else(|| paused_from.and_then(|s| s.progress_percentage()))
        .unwrap_or(0)
}

pub(super) fn build_report(
    machine: &StateMachine,
    started_at: Instant,
    message: String,
    details: Option<String>,
) -> ProgressReport {
    let state = machine.state();
    ProgressReport {
        state,
        percentage: percentage_for(state, machine.paused_from()),
        message,
        elapsed_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
        iteration: machine.iteration(),
        details,
    }
}

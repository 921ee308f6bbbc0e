//! Port for the structured audit trail.
//!
//! Defines the [`AuditLog`] trait for recording supervisor events (run
//! start/finish, state transitions, decisions) as machine-readable records.
//!
//! This is separate from `tracing`-based operation logs: tracing handles
//! human-readable diagnostics, while this port captures the run's history
//! in a format (JSONL) that can be replayed or inspected later.

use serde_json::Value;

/// Event type for [`AuditEvent::run_started`].
pub const RUN_STARTED: &str = "run_started";
/// Event type for every state machine transition.
pub const STATE_TRANSITION: &str = "state_transition";
/// Event type for [`AuditEvent::run_finished`].
pub const RUN_FINISHED: &str = "run_finished";
/// Event type for decision engine results.
pub const DECISION: &str = "decision";

/// A structured audit event.
///
/// The sink adds the timestamp; the payload holds event-specific fields.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditEvent {
    /// Event type identifier (e.g., "state_transition").
    pub event_type: &'static str,
    pub payload: Value,
}

impl AuditEvent {
    pub fn new(event_type: &'static str, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }

    pub fn run_started(payload: Value) -> Self {
        Self::new(RUN_STARTED, payload)
    }

    pub fn state_transition(payload: Value) -> Self {
        Self::new(STATE_TRANSITION, payload)
    }

    pub fn run_finished(payload: Value) -> Self {
        Self::new(RUN_FINISHED, payload)
    }

    pub fn decision(payload: Value) -> Self {
        Self::new(DECISION, payload)
    }
}

/// Port for writing audit events.
///
/// `log` is synchronous and non-fallible: a failing sink must not disturb
/// the run, so implementations swallow their own write errors.
pub trait AuditLog: Send + Sync {
    fn log(&self, event: AuditEvent);
}

/// No-op implementation for tests and when auditing is disabled.
pub struct NoAuditLog;

impl AuditLog for NoAuditLog {
    fn log(&self, _event: AuditEvent) {}
}

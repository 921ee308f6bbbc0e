//! Type definitions for the supervisor loop.

use crate::ports::persistence::PersistenceError;
use crate::ports::phase_handler::PhaseError;
use ralph_domain::{
    DomainError, ExecutionResult, SupervisorState, TaskId, TaskPlan, VerificationResult,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while driving the loop
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("Supervisor loop is already running")]
    AlreadyRunning,

    #[error("State machine error: {0}")]
    StateMachine(#[from] DomainError),

    #[error("Phase handler failed: {0}")]
    Phase(#[from] PhaseError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl LoopError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LoopError::Cancelled)
    }
}

/// Output of one [`run`](super::SupervisorLoop::run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopResult {
    /// True only when the task reached COMPLETE
    pub success: bool,
    pub final_state: SupervisorState,
    pub task_id: Option<TaskId>,
    pub plan: Option<TaskPlan>,
    pub execution_results: Option<Vec<ExecutionResult>>,
    pub verification: Option<VerificationResult>,
    /// ITERATE cycles counted on the task, including a budget-exhausting one
    pub iterations: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Periodic and per-phase progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressReport {
    pub state: SupervisorState,
    /// 0 - 100; while PAUSED, the percentage of the paused-from state
    pub percentage: u8,
    pub message: String,
    pub elapsed_ms: u64,
    pub iteration: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

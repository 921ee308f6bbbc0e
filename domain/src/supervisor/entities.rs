//! Supervisor domain entities

use super::state::SupervisorState;
use super::value_objects::{
    ExecutionResult, Metadata, TaskId, TaskPlan, VerificationResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current version of the [`PersistedState`] format.
pub const PERSISTED_STATE_VERSION: u32 = 1;

/// The single in-flight task (Entity).
///
/// Created by `initialize`, mutated on every transition, discarded by `reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskContext {
    /// Unique identifier for this task
    pub id: TaskId,
    /// The task description given to the loop
    pub description: String,
    /// Number of completed ITERATE cycles
    pub iteration: u32,
    /// Iteration budget; reaching it fails the task
    pub max_iterations: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Most recent plan produced by the plan handler
    pub plan: Option<TaskPlan>,
    /// Most recent execution results
    pub execution_results: Option<Vec<ExecutionResult>>,
    /// Most recent verification
    pub verification: Option<VerificationResult>,
    /// Terminal error, set when the task fails
    pub error: Option<String>,
    /// Caller-supplied metadata
    #[serde(default)]
    pub metadata: Metadata,
}

impl TaskContext {
    /// Creates a fresh task at iteration 0 with a generated identifier.
    pub fn new(description: impl Into<String>, max_iterations: u32, metadata: Metadata) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            description: description.into(),
            iteration: 0,
            max_iterations,
            created_at: now,
            updated_at: now,
            plan: None,
            execution_results: None,
            verification: None,
            error: None,
            metadata,
        }
    }

    /// Refresh `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Whether the iteration budget has been used up.
    pub fn iterations_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

/// Context recorded with a transition.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransitionContext {
    /// Set on transitions into `PAUSED`: the state to return to on resume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_from: Option<SupervisorState>,
    /// Free-form details
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub details: Metadata,
}

impl TransitionContext {
    pub fn paused_from(state: SupervisorState) -> Self {
        Self {
            paused_from: Some(state),
            details: Metadata::new(),
        }
    }
}

/// Immutable record of one state change, appended to the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: SupervisorState,
    pub to: SupervisorState,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: TransitionContext,
}

impl StateTransition {
    pub fn new(
        from: SupervisorState,
        to: SupervisorState,
        reason: impl Into<String>,
        context: TransitionContext,
    ) -> Self {
        Self {
            from,
            to,
            reason: reason.into(),
            timestamp: Utc::now(),
            context,
        }
    }
}

/// Find the state recorded by the most recent transition into `PAUSED`.
pub fn last_paused_from(history: &[StateTransition]) -> Option<SupervisorState> {
    history
        .iter()
        .rev()
        .find(|t| t.to == SupervisorState::Paused)
        .and_then(|t| t.context.paused_from)
}

/// Durable snapshot of the supervisor, used for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub task_context: TaskContext,
    pub current_state: SupervisorState,
    pub state_history: Vec<StateTransition>,
    pub persisted_at: DateTime<Utc>,
    pub version: u32,
}

impl PersistedState {
    pub fn new(
        task_context: TaskContext,
        current_state: SupervisorState,
        state_history: Vec<StateTransition>,
    ) -> Self {
        Self {
            task_context,
            current_state,
            state_history,
            persisted_at: Utc::now(),
            version: PERSISTED_STATE_VERSION,
        }
    }

    /// Whether this snapshot was written by a format version this build understands.
    pub fn is_supported_version(&self) -> bool {
        self.version <= PERSISTED_STATE_VERSION
    }

    /// Time elapsed since the snapshot was taken.
    pub fn age(&self) -> std::time::Duration {
        (Utc::now() - self.persisted_at).to_std().unwrap_or_default()
    }
}

//! Supervisor domain module
//!
//! States, the static transition table, and the task entities that the
//! state machine owns and persists.

pub mod entities;
pub mod state;
pub mod transition_table;
pub mod value_objects;

pub use entities::{
    PERSISTED_STATE_VERSION, PersistedState, StateTransition, TaskContext, TransitionContext,
    last_paused_from,
};
pub use state::SupervisorState;
pub use value_objects::{
    CriterionResult, ExecutionResult, Metadata, MetadataValue, PlanStep, StepStatus, StepType,
    TaskId, TaskPlan, VerificationResult,
};

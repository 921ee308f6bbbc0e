//! Domain layer for ralph-loop
//!
//! This crate contains the core business logic, entities, and value objects.
//! It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Supervisor
//!
//! A single task is driven through a fixed lifecycle:
//!
//! ```text
//! IDLE -> PLAN -> EXECUTE -> VERIFY -> COMPLETE
//!                    ^          |
//!                    +- ITERATE +
//! ```
//!
//! Any active state may move to `FAILED` or `PAUSED`; `PAUSED` resumes to
//! the state it was paused from. The table lives in
//! [`supervisor::transition_table`].
//!
//! ## Decision Engine
//!
//! [`decision::DecisionEngine`] turns a phase's results into an outcome
//! (CONTINUE, RETRY, ITERATE, COMPLETE, ABORT, PAUSE) with a confidence
//! and a reason, and keeps an auditable log of every decision.

pub mod config;
pub mod core;
pub mod decision;
pub mod supervisor;

// Re-export commonly used types
pub use config::OutputFormat;
pub use core::error::DomainError;
pub use decision::{
    DecisionConfig, DecisionEngine, DecisionLogEntry, DecisionOutcome, DecisionOverride,
    DecisionResult, DecisionStatistics, PhaseEvaluation,
};
pub use supervisor::{
    CriterionResult, ExecutionResult, Metadata, MetadataValue, PERSISTED_STATE_VERSION,
    PersistedState, PlanStep, StateTransition, StepStatus, StepType, SupervisorState, TaskContext,
    TaskId, TaskPlan, TransitionContext, VerificationResult, last_paused_from,
};

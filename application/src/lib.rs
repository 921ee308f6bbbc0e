//! Application layer for ralph-loop
//!
//! This crate contains the state machine, the supervisor loop use case,
//! port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod state_machine;
pub mod use_cases;

// Re-export commonly used types
pub use config::{LoopConfig, StateMachineConfig};
pub use ports::{
    audit_log::{AuditEvent, AuditLog, NoAuditLog},
    persistence::{InMemoryPersistence, PersistenceError, StatePersistence},
    phase_handler::{
        ExecuteHandler, PhaseContext, PhaseError, PhaseHandlers, PlanHandler, VerifyHandler,
    },
};
pub use state_machine::{StateMachine, Subscription, WeakStateMachine};
pub use use_cases::run_supervisor::{
    LoopError, LoopResult, ProgressReport, RecoveryInfo, SupervisorLoop,
};

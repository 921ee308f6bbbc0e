//! Decision engine domain module
//!
//! Evaluates a phase's raw results and decides what the supervisor should
//! do next: continue, retry, iterate, complete, abort or pause.

pub mod config;
pub mod engine;
pub mod evaluation;
pub mod outcome;

pub use config::DecisionConfig;
pub use engine::DecisionEngine;
pub use evaluation::{
    CRITICAL_CRITERION_KEYWORDS, PhaseEvaluation, is_critical_criterion, is_critical_error,
    suggestion_for_error,
};
pub use outcome::{
    DecisionLogEntry, DecisionOutcome, DecisionOverride, DecisionResult, DecisionStatistics,
};

//! Phase handler ports
//!
//! The loop supplies the control discipline; the host supplies the work.
//! Each handler receives a [`PhaseContext`] snapshot of the task and returns
//! a structured result, or a [`PhaseError`] which fails the run.

use async_trait::async_trait;
use ralph_domain::{
    ExecutionResult, Metadata, TaskContext, TaskId, TaskPlan, VerificationResult,
};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a phase handler.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhaseError {
    #[error("{0}")]
    Failed(String),

    #[error("{phase} handler produced no usable result: {reason}")]
    InvalidResult { phase: &'static str, reason: String },
}

impl PhaseError {
    pub fn failed(message: impl Into<String>) -> Self {
        PhaseError::Failed(message.into())
    }
}

/// Read-only view of the task handed to every phase handler.
///
/// `previous_*` fields carry whatever the earlier phases stored on the task,
/// so an execute handler running after ITERATE sees the last verification.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseContext {
    pub task_id: TaskId,
    pub task: String,
    pub iteration: u32,
    pub max_iterations: u32,
    pub previous_plan: Option<TaskPlan>,
    pub previous_results: Option<Vec<ExecutionResult>>,
    pub previous_verification: Option<VerificationResult>,
    pub metadata: Metadata,
}

impl PhaseContext {
    pub fn from_task(task: &TaskContext) -> Self {
        Self {
            task_id: task.id.clone(),
            task: task.description.clone(),
            iteration: task.iteration,
            max_iterations: task.max_iterations,
            previous_plan: task.plan.clone(),
            previous_results: task.execution_results.clone(),
            previous_verification: task.verification.clone(),
            metadata: task.metadata.clone(),
        }
    }
}

/// Produces a plan for the task.
#[async_trait]
pub trait PlanHandler: Send + Sync {
    async fn plan(&self, context: &PhaseContext) -> Result<TaskPlan, PhaseError>;
}

/// Executes the stored plan, one result per step.
#[async_trait]
pub trait ExecuteHandler: Send + Sync {
    async fn execute(&self, context: &PhaseContext) -> Result<Vec<ExecutionResult>, PhaseError>;
}

/// Checks the execution results against the plan's success criteria.
#[async_trait]
pub trait VerifyHandler: Send + Sync {
    async fn verify(&self, context: &PhaseContext) -> Result<VerificationResult, PhaseError>;
}

/// The three handlers a loop is constructed with.
#[derive(Clone)]
pub struct PhaseHandlers {
    pub plan: Arc<dyn PlanHandler>,
    pub execute: Arc<dyn ExecuteHandler>,
    pub verify: Arc<dyn VerifyHandler>,
}

impl PhaseHandlers {
    pub fn new(
        plan: Arc<dyn PlanHandler>,
        execute: Arc<dyn ExecuteHandler>,
        verify: Arc<dyn VerifyHandler>,
    ) -> Self {
        Self {
            plan,
            execute,
            verify,
        }
    }

    /// Use one value implementing all three handler traits.
    pub fn from_shared<T>(handler: Arc<T>) -> Self
    where
        T: PlanHandler + ExecuteHandler + VerifyHandler + 'static,
    {
        Self {
            plan: handler.clone(),
            execute: handler.clone(),
            verify: handler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_from_task() {
        let mut task = TaskContext::new("Add input validation", 4, Metadata::new());
        task.iteration = 1;
        task.plan = Some(TaskPlan::new().with_criterion("tests pass"));

        let context = PhaseContext::from_task(&task);
        assert_eq!(context.task, "Add input validation");
        assert_eq!(context.iteration, 1);
        assert_eq!(context.max_iterations, 4);
        assert!(context.previous_plan.is_some());
        assert!(context.previous_results.is_none());
    }

    #[test]
    fn test_phase_error_display() {
        assert_eq!(PhaseError::failed("boom").to_string(), "boom");
        let invalid = PhaseError::InvalidResult {
            phase: "plan",
            reason: "empty".to_string(),
        };
        assert_eq!(
            invalid.to_string(),
            "plan handler produced no usable result: empty"
        );
    }
}

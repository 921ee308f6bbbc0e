//! State persistence adapters.
//!
//! Provides [`FileStatePersistence`], which implements the
//! [`StatePersistence`](ralph_application::StatePersistence) port.

mod file_state;

pub use file_state::{DEFAULT_STATE_FILE, FileStatePersistence};

#[cfg(test)]
mod supervisor_tests {
    use super::FileStatePersistence;
    use async_trait::async_trait;
    use ralph_application::{
        ExecuteHandler, LoopConfig, PhaseContext, PhaseError, PhaseHandlers, PlanHandler,
        StatePersistence, SupervisorLoop, VerifyHandler,
    };
    use ralph_domain::{
        CriterionResult, ExecutionResult, Metadata, StepType, SupervisorState, TaskPlan,
        VerificationResult,
    };
    use std::sync::Arc;

    const TASK: &str = "Add input validation";

    struct Handlers {
        execute_error: Option<&'static str>,
    }

    #[async_trait]
    impl PlanHandler for Handlers {
        async fn plan(&self, _context: &PhaseContext) -> Result<TaskPlan, PhaseError> {
            Ok(TaskPlan::new()
                .with_step("Validate email field", StepType::Code)
                .with_criterion("Invalid input is rejected"))
        }
    }

    #[async_trait]
    impl ExecuteHandler for Handlers {
        async fn execute(&self, _context: &PhaseContext) -> Result<Vec<ExecutionResult>, PhaseError> {
            match self.execute_error {
                Some(error) => Err(PhaseError::failed(error)),
                None => Ok(vec![ExecutionResult::success(0, "done")]),
            }
        }
    }

    #[async_trait]
    impl VerifyHandler for Handlers {
        async fn verify(&self, _context: &PhaseContext) -> Result<VerificationResult, PhaseError> {
            Ok(VerificationResult::from_criteria(vec![
                CriterionResult::passed("Invalid input is rejected"),
            ]))
        }
    }

    fn supervisor(persistence: &Arc<FileStatePersistence>, execute_error: Option<&'static str>) -> SupervisorLoop {
        SupervisorLoop::new(
            PhaseHandlers::from_shared(Arc::new(Handlers { execute_error })),
            persistence.clone(),
            LoopConfig::default().with_progress_interval(None),
        )
    }

    #[tokio::test]
    async fn test_failed_run_leaves_snapshot_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(FileStatePersistence::new(dir.path().join("state.json")));

        let result = supervisor(&persistence, Some("executor crashed"))
            .run(TASK, Metadata::new())
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);

        let snapshot = persistence.load().unwrap();
        assert_eq!(snapshot.current_state, SupervisorState::Failed);
        assert!(
            snapshot
                .task_context
                .error
                .as_deref()
                .is_some_and(|e| e.contains("executor crashed"))
        );

        // Visible to the next process, but not resumable
        let next = supervisor(&persistence, None);
        let info = next.recovery_info().unwrap();
        assert!(!info.resumable);
        assert!(!next.has_recoverable_state());

        next.discard_recovery().unwrap();
        assert!(!persistence.exists());
    }

    #[tokio::test]
    async fn test_interrupted_task_resumes_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(FileStatePersistence::new(dir.path().join(".ralph/state.json")));

        {
            let crashed = supervisor(&persistence, None);
            crashed.machine().initialize(TASK, Metadata::new()).unwrap();
            crashed
                .machine()
                .set_plan(TaskPlan::new().with_step("Validate email field", StepType::Code))
                .unwrap();
            crashed.machine().start_execution().unwrap();
        }
        assert_eq!(
            persistence.load().map(|s| s.current_state),
            Some(SupervisorState::Execute)
        );

        let resumed = supervisor(&persistence, None);
        let info = resumed.recover().unwrap().unwrap();
        assert_eq!(info.state, SupervisorState::Execute);

        let result = resumed.run(TASK, Metadata::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.task_id, Some(info.task_id));
        assert!(!persistence.exists());
    }
}

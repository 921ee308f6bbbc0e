//! Simulated phase handlers.
//!
//! Stand-ins for model-backed handlers: the planner emits a fixed number of
//! steps, the executor sleeps per step and can be told to fail one, and the
//! verifier fails a configurable number of rounds. Every phase result is
//! run through a [`DecisionEngine`] and the decision is written to the audit
//! log.

use async_trait::async_trait;
use ralph_application::{
    AuditEvent, AuditLog, ExecuteHandler, PhaseContext, PhaseError, PlanHandler, VerifyHandler,
};
use ralph_domain::{
    CriterionResult, DecisionConfig, DecisionEngine, DecisionOutcome, DecisionResult,
    ExecutionResult, StepType, SupervisorState, TaskPlan, VerificationResult,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

const STEP_TYPES: [StepType; 4] = [
    StepType::Research,
    StepType::Code,
    StepType::Test,
    StepType::Documentation,
];

const ALL_STEPS_CRITERION: &str = "Every planned step ran successfully";
const TESTS_CRITERION: &str = "Acceptance tests pass";

/// Knobs for [`SimulatedHandlers`].
#[derive(Debug, Clone)]
pub struct Simulation {
    pub steps: usize,
    pub step_delay: Duration,
    pub failing_verifications: u32,
    pub fail_step: Option<usize>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self {
            steps: 3,
            step_delay: Duration::ZERO,
            failing_verifications: 0,
            fail_step: None,
        }
    }
}

pub struct SimulatedHandlers {
    simulation: Simulation,
    remaining_failures: AtomicU32,
    engine: Mutex<DecisionEngine>,
    audit: Arc<dyn AuditLog>,
}

impl SimulatedHandlers {
    pub fn new(simulation: Simulation, decision: DecisionConfig, audit: Arc<dyn AuditLog>) -> Self {
        Self {
            remaining_failures: AtomicU32::new(simulation.failing_verifications),
            simulation,
            engine: Mutex::new(DecisionEngine::new(decision)),
            audit,
        }
    }

    fn engine(&self) -> std::sync::MutexGuard<'_, DecisionEngine> {
        self.engine.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decisions recorded so far.
    pub fn decisions(&self) -> Vec<DecisionResult> {
        self.engine()
            .decision_log()
            .iter()
            .map(|entry| entry.decision.clone())
            .collect()
    }

    fn record(&self, phase: SupervisorState, context: &PhaseContext, decision: &DecisionResult) {
        info!(
            task_id = %context.task_id,
            phase = %phase,
            outcome = %decision.outcome,
            confidence = decision.confidence,
            reason = %decision.reason,
            "Decision"
        );
        self.audit.log(AuditEvent::decision(serde_json::json!({
            "task_id": context.task_id.as_str(),
            "iteration": context.iteration,
            "phase": phase.as_str(),
            "log_id": decision.log_id,
            "outcome": decision.outcome.as_str(),
            "confidence": decision.confidence,
            "reason": decision.reason,
            "success_rate": decision.evaluation.success_rate,
            "requires_confirmation": decision.requires_confirmation,
        })));
    }

    fn step_error(step_index: usize) -> String {
        format!("assertion failed in step {}: 2 tests failed", step_index + 1)
    }
}

#[async_trait]
impl PlanHandler for SimulatedHandlers {
    async fn plan(&self, context: &PhaseContext) -> Result<TaskPlan, PhaseError> {
        let plan = (0..self.simulation.steps).fold(
            TaskPlan::new()
                .with_criterion(ALL_STEPS_CRITERION)
                .with_criterion(TESTS_CRITERION),
            |plan, i| {
                plan.with_step(
                    format!("{} ({}/{})", context.task, i + 1, self.simulation.steps),
                    STEP_TYPES[i % STEP_TYPES.len()],
                )
            },
        );

        let decision = {
            let mut engine = self.engine();
            engine.reset_retries();
            engine.evaluate_plan(plan.step_count() > 0, plan.step_count())
        };
        self.record(SupervisorState::Plan, context, &decision);
        Ok(plan)
    }
}

#[async_trait]
impl ExecuteHandler for SimulatedHandlers {
    async fn execute(&self, context: &PhaseContext) -> Result<Vec<ExecutionResult>, PhaseError> {
        let steps = context
            .previous_plan
            .as_ref()
            .map(|plan| plan.step_count())
            .ok_or_else(|| PhaseError::failed("No plan to execute"))?;

        let mut results = Vec::with_capacity(steps);
        for step_index in 0..steps {
            let started = Instant::now();
            if !self.simulation.step_delay.is_zero() {
                tokio::time::sleep(self.simulation.step_delay).await;
            }
            let elapsed = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let result = if self.simulation.fail_step == Some(step_index) {
                ExecutionResult::failure(step_index, Self::step_error(step_index))
            } else {
                ExecutionResult::success(step_index, format!("Step {} done", step_index + 1))
            };
            debug!(step = step_index, success = result.success, "Simulated step finished");
            results.push(result.with_duration_ms(elapsed));
        }

        let decision = self.engine().evaluate_execution(&results);
        self.record(SupervisorState::Execute, context, &decision);
        if decision.outcome == DecisionOutcome::Abort {
            return Err(PhaseError::failed(decision.reason));
        }
        Ok(results)
    }
}

#[async_trait]
impl VerifyHandler for SimulatedHandlers {
    async fn verify(&self, context: &PhaseContext) -> Result<VerificationResult, PhaseError> {
        let failed_steps: Vec<usize> = context
            .previous_results
            .iter()
            .flatten()
            .filter(|r| !r.success)
            .map(|r| r.step_index + 1)
            .collect();

        let steps_criterion = if failed_steps.is_empty() {
            CriterionResult::passed(ALL_STEPS_CRITERION)
        } else {
            CriterionResult::failed(
                ALL_STEPS_CRITERION,
                format!("steps {:?} failed", failed_steps),
            )
        };

        let tests_fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let tests_criterion = if tests_fail {
            CriterionResult::failed(TESTS_CRITERION, "1 of 12 tests failed")
        } else {
            CriterionResult::passed(TESTS_CRITERION)
        };

        let mut result = VerificationResult::from_criteria(vec![steps_criterion, tests_criterion]);
        if tests_fail {
            result = result.with_suggestion("Fix the failing acceptance test");
        }
        for step in &failed_steps {
            result = result.with_suggestion(format!("Rework step {}", step));
        }

        let decision = self.engine().evaluate_verification(&result);
        self.record(SupervisorState::Verify, context, &decision);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ralph_application::{
        InMemoryPersistence, LoopConfig, NoAuditLog, PhaseHandlers, SupervisorLoop,
    };
    use ralph_domain::{Metadata, TaskContext};

    struct Collecting(Mutex<Vec<AuditEvent>>);

    impl AuditLog for Collecting {
        fn log(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn run_loop(simulation: Simulation, max_iterations: u32) -> (Arc<SimulatedHandlers>, SupervisorLoop) {
        let handlers = Arc::new(SimulatedHandlers::new(
            simulation,
            DecisionConfig::default(),
            Arc::new(NoAuditLog),
        ));
        let supervisor = SupervisorLoop::new(
            PhaseHandlers::from_shared(handlers.clone()),
            Arc::new(InMemoryPersistence::new()),
            LoopConfig::default()
                .with_progress_interval(None)
                .with_max_iterations(max_iterations),
        );
        (handlers, supervisor)
    }

    #[tokio::test]
    async fn test_clean_run_completes() {
        let (handlers, supervisor) = run_loop(Simulation::default(), 5);
        let result = supervisor.run("Add input validation", Metadata::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.iterations, 0);
        let outcomes: Vec<_> = handlers.decisions().iter().map(|d| d.outcome).collect();
        assert_eq!(
            outcomes,
            vec![
                DecisionOutcome::Continue,
                DecisionOutcome::Continue,
                DecisionOutcome::Complete
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_verifications_iterate_then_pass() {
        let simulation = Simulation {
            failing_verifications: 2,
            ..Default::default()
        };
        let (_, supervisor) = run_loop(simulation, 5);
        let result = supervisor.run("Fix the flaky test", Metadata::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.iterations, 2);
    }

    #[tokio::test]
    async fn test_failing_step_exhausts_iterations() {
        let simulation = Simulation {
            fail_step: Some(1),
            ..Default::default()
        };
        let (_, supervisor) = run_loop(simulation, 2);
        let result = supervisor.run("Refactor parser", Metadata::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);
        let verification = result.verification.unwrap();
        assert!(verification.suggestions.iter().any(|s| s == "Rework step 2"));
    }

    #[tokio::test]
    async fn test_decisions_are_audited() {
        let audit = Arc::new(Collecting(Mutex::new(Vec::new())));
        let handlers = SimulatedHandlers::new(
            Simulation::default(),
            DecisionConfig::default(),
            audit.clone(),
        );
        let context =
            PhaseContext::from_task(&TaskContext::new("Add input validation", 5, Metadata::new()));

        let plan = handlers.plan(&context).await.unwrap();
        assert_eq!(plan.step_count(), 3);

        let events = audit.0.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "decision");
        assert_eq!(events[0].payload["phase"], "PLAN");
        assert_eq!(events[0].payload["outcome"], "CONTINUE");
    }
}

//! Run Supervisor use case
//!
//! Drives one task through the state machine with the host's phase
//! handlers until it reaches a terminal state:
//!
//! | State   | Action                                               | Next            |
//! |---------|------------------------------------------------------|-----------------|
//! | PLAN    | plan handler, store plan                             | EXECUTE         |
//! | EXECUTE | execute handler, store results                       | VERIFY          |
//! | VERIFY  | verify handler, store verification                   | COMPLETE / ITERATE / FAILED |
//! | ITERATE | report progress                                      | EXECUTE         |
//! | PAUSED  | wait for `resume()`                                  | paused-from     |
//!
//! A handler error fails the task and leaves its snapshot persisted. Only
//! a COMPLETE run clears the persisted snapshot.

mod pause;
mod progress;
mod recovery;
mod types;

pub use progress::ProgressCallback;
pub use recovery::RecoveryInfo;
pub use types::{LoopError, LoopResult, ProgressReport};

use crate::config::LoopConfig;
use crate::ports::audit_log::{AuditEvent, AuditLog, NoAuditLog};
use crate::ports::persistence::StatePersistence;
use crate::ports::phase_handler::{PhaseContext, PhaseError, PhaseHandlers};
use crate::state_machine::{StateMachine, Subscription};
use pause::PauseGate;
use progress::ProgressHub;
use ralph_domain::core::string::{join_or, truncate};
use ralph_domain::{DomainError, Metadata, StateTransition, SupervisorState};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Clears the running flag when a run ends, however it ends.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// The supervisor loop: one instance, one task at a time.
pub struct SupervisorLoop {
    handlers: PhaseHandlers,
    config: LoopConfig,
    machine: StateMachine,
    persistence: Arc<dyn StatePersistence>,
    audit: Arc<dyn AuditLog>,
    progress: ProgressHub,
    gate: Arc<PauseGate>,
    running: AtomicBool,
    current_run: Mutex<Option<CancellationToken>>,
    subscriptions: Vec<Subscription>,
}

impl SupervisorLoop {
    pub fn new(
        handlers: PhaseHandlers,
        persistence: Arc<dyn StatePersistence>,
        config: LoopConfig,
    ) -> Self {
        let machine = StateMachine::new(config.machine.clone());
        let gate = Arc::new(PauseGate::new());
        let mut subscriptions = vec![open_gate_on_leaving_pause(&machine, gate.clone())];
        if config.auto_persist {
            subscriptions.push(persist_on_transition(&machine, persistence.clone()));
        }

        Self {
            handlers,
            config,
            machine,
            persistence,
            audit: Arc::new(NoAuditLog),
            progress: ProgressHub::new(),
            gate,
            running: AtomicBool::new(false),
            current_run: Mutex::new(None),
            subscriptions,
        }
    }

    /// Record run and transition events to an audit sink.
    pub fn with_audit_log(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.subscriptions
            .push(audit_on_transition(&self.machine, audit.clone()));
        self.audit = audit;
        self
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn on_progress<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ProgressReport) + Send + Sync + 'static,
    {
        self.progress.subscribe(Arc::new(callback))
    }

    fn current_run(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current_run.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Control ====================

    /// Pause the task. Returns `false` if it was already paused.
    ///
    /// A running handler finishes first; the loop stops before the next transition.
    pub fn pause(&self, reason: Option<&str>) -> Result<bool, LoopError> {
        if self.gate.is_closed() {
            debug!("Pause requested while already paused");
            return Ok(false);
        }
        match self.machine.pause(reason) {
            Ok(_) => {
                self.gate.close();
                info!(reason = reason.unwrap_or("Paused"), "Supervisor loop paused");
                Ok(true)
            }
            Err(_) if self.machine.state() == SupervisorState::Paused => {
                self.gate.close();
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Resume a paused task. Returns `false` if it was not paused.
    pub fn resume(&self) -> Result<bool, LoopError> {
        let machine_paused = self.machine.state() == SupervisorState::Paused;
        if !machine_paused && !self.gate.is_closed() {
            return Ok(false);
        }
        if machine_paused {
            self.machine.resume()?;
        }
        self.gate.open();
        info!(state = %self.machine.state(), "Supervisor loop resumed");
        Ok(true)
    }

    /// Abandon the task: cancel the running handler, discard the task and
    /// clear persisted state.
    pub fn reset(&self) {
        if let Some(token) = self.current_run().as_ref() {
            token.cancel();
        }
        self.machine.reset();
        self.gate.open();
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "Failed to clear persisted state on reset");
        }
    }

    // ==================== Run ====================

    /// Drive `task` to a terminal state.
    ///
    /// Continues a restored task instead of starting a new one when the
    /// machine is not idle. Handler failures come back as an unsuccessful
    /// [`LoopResult`], not as `Err`.
    pub async fn run(&self, task: &str, metadata: Metadata) -> Result<LoopResult, LoopError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }
        let _running = RunningFlag(&self.running);

        let token = CancellationToken::new();
        *self.current_run() = Some(token.clone());
        let result = self.run_inner(task, metadata, &token).await;
        *self.current_run() = None;
        result
    }

    async fn run_inner(
        &self,
        task: &str,
        metadata: Metadata,
        token: &CancellationToken,
    ) -> Result<LoopResult, LoopError> {
        let started_at = Instant::now();
        self.prepare(task, metadata)?;

        let task_id = self.machine.task_context().map(|t| t.id);
        info!(
            task_id = ?task_id.as_ref().map(|id| id.as_str()),
            state = %self.machine.state(),
            "Supervisor loop started"
        );
        self.audit.log(AuditEvent::run_started(json!({
            "task_id": task_id,
            "description": task,
            "state": self.machine.state(),
        })));
        self.progress.report(
            &self.machine,
            started_at,
            format!("Started task: {}", truncate(task, 80)),
            None,
        );

        let timers = token.child_token();
        let ticks = self.spawn_timers(&timers, started_at);
        let outcome = self.drive(token, started_at).await;
        timers.cancel();
        for tick in ticks {
            if let Err(e) = tick.await {
                debug!(error = %e, "Periodic timer task ended abnormally");
            }
        }

        let result = match outcome {
            _ if token.is_cancelled() => {
                info!("Supervisor loop cancelled by reset");
                self.build_result(started_at, Some("Run cancelled by reset".to_string()))
            }
            Err(error) if error.is_cancelled() => {
                info!("Task discarded while the loop was running");
                self.build_result(started_at, Some("Run cancelled by reset".to_string()))
            }
            Ok(()) => {
                if self.machine.state() == SupervisorState::Complete
                    && let Err(e) = self.persistence.clear()
                {
                    warn!(error = %e, "Failed to clear persisted state after completion");
                }
                self.build_result(started_at, None)
            }
            Err(error) => self.fail_run(error, started_at),
        };

        self.progress.report(
            &self.machine,
            started_at,
            if result.success {
                "Task complete".to_string()
            } else {
                format!(
                    "Task ended in {}",
                    result.final_state.display_name()
                )
            },
            result.error.clone(),
        );
        info!(
            success = result.success,
            final_state = %result.final_state,
            iterations = result.iterations,
            duration_ms = result.duration_ms,
            "Supervisor loop finished"
        );
        self.audit.log(AuditEvent::run_finished(
            serde_json::to_value(&result).unwrap_or_default(),
        ));
        Ok(result)
    }

    /// Get the machine ready to drive `task`.
    fn prepare(&self, task: &str, metadata: Metadata) -> Result<(), LoopError> {
        if self.config.auto_recover && self.machine.state() == SupervisorState::Idle {
            self.restore_resumable(|snapshot| snapshot.task_context.description == task);
        }
        if self.machine.is_terminal() {
            self.machine.reset();
        }

        match self.machine.state() {
            SupervisorState::Idle => {
                self.gate.open();
                self.machine.initialize(task, metadata)?;
            }
            SupervisorState::Paused => {
                info!("Continuing restored task in PAUSED; waiting for resume");
                self.gate.close();
            }
            state => info!(state = %state, "Continuing restored task"),
        }
        Ok(())
    }

    async fn drive(&self, token: &CancellationToken, started_at: Instant) -> Result<(), LoopError> {
        loop {
            self.wait_while_paused(token).await?;

            match self.machine.state() {
                SupervisorState::Complete | SupervisorState::Failed => return Ok(()),
                SupervisorState::Idle => return Err(LoopError::Cancelled),
                SupervisorState::Paused => {
                    // Paused directly on the machine; hold the loop until resume()
                    self.gate.close();
                }
                SupervisorState::Plan => {
                    let context = self.phase_context()?;
                    let plan = self
                        .run_handler(token, self.handlers.plan.plan(&context))
                        .await?;
                    if plan.steps.is_empty() {
                        return Err(PhaseError::InvalidResult {
                            phase: "plan",
                            reason: "plan contains no steps".to_string(),
                        }
                        .into());
                    }
                    let message = format!("Plan created with {} steps", plan.step_count());
                    self.machine.set_plan(plan)?;
                    self.progress.report(&self.machine, started_at, message, None);
                    self.advance(token, StateMachine::start_execution).await?;
                }
                SupervisorState::Execute => {
                    let context = self.phase_context()?;
                    let results = self
                        .run_handler(token, self.handlers.execute.execute(&context))
                        .await?;
                    let passed = results.iter().filter(|r| r.success).count();
                    let message = format!("Executed {}/{} steps successfully", passed, results.len());
                    self.machine.set_execution_results(results)?;
                    self.progress.report(&self.machine, started_at, message, None);
                    self.advance(token, StateMachine::start_verification).await?;
                }
                SupervisorState::Verify => {
                    let context = self.phase_context()?;
                    let verification = self
                        .run_handler(token, self.handlers.verify.verify(&context))
                        .await?;
                    let (passed, total) = verification.counts();
                    let succeeded = verification.passed;
                    let reason = join_or(&verification.suggestions, "Verification failed");
                    self.machine.set_verification(verification)?;

                    if succeeded {
                        self.progress.report(
                            &self.machine,
                            started_at,
                            format!("Verification passed ({}/{} criteria)", passed, total),
                            None,
                        );
                        self.advance(token, StateMachine::complete).await?;
                    } else {
                        self.progress.report(
                            &self.machine,
                            started_at,
                            format!("Verification failed ({}/{} criteria)", passed, total),
                            Some(reason.clone()),
                        );
                        self.advance(token, |machine| machine.iterate(reason.clone()))
                            .await?;
                    }
                }
                SupervisorState::Iterate => {
                    let (iteration, max_iterations) = self
                        .machine
                        .task_context()
                        .map_or((0, 0), |t| (t.iteration, t.max_iterations));
                    let details = self.machine.history().last().map(|t| t.reason.clone());
                    self.progress.report(
                        &self.machine,
                        started_at,
                        format!("Starting iteration {} of {}", iteration, max_iterations),
                        details,
                    );
                    self.advance(token, StateMachine::start_execution).await?;
                }
            }
        }
    }

    /// Apply the next transition once the gate is open.
    ///
    /// A pause that lands between the gate check and the transition is
    /// waited out and the transition retried.
    async fn advance<F>(&self, token: &CancellationToken, transition: F) -> Result<(), LoopError>
    where
        F: Fn(&StateMachine) -> Result<StateTransition, DomainError>,
    {
        loop {
            self.wait_while_paused(token).await?;
            if self.machine.is_terminal() {
                return Ok(());
            }
            match transition(&self.machine) {
                Ok(_) => return Ok(()),
                Err(_) if self.machine.state() == SupervisorState::Paused => {
                    self.gate.close();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn wait_while_paused(&self, token: &CancellationToken) -> Result<(), LoopError> {
        if token.is_cancelled() {
            return Err(LoopError::Cancelled);
        }
        if !self.gate.is_closed() {
            return Ok(());
        }
        // Left PAUSED before the gate was closed (timeout, host fail or resume)
        if self.machine.state() != SupervisorState::Paused {
            self.gate.open();
            return Ok(());
        }
        info!("Supervisor loop waiting for resume");
        tokio::select! {
            _ = token.cancelled() => Err(LoopError::Cancelled),
            _ = self.gate.wait_open() => Ok(()),
        }
    }

    async fn run_handler<T>(
        &self,
        token: &CancellationToken,
        handler: impl Future<Output = Result<T, PhaseError>>,
    ) -> Result<T, LoopError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(LoopError::Cancelled),
            result = handler => result.map_err(LoopError::from),
        }
    }

    fn phase_context(&self) -> Result<PhaseContext, LoopError> {
        self.machine
            .task_context()
            .map(|task| PhaseContext::from_task(&task))
            .ok_or(LoopError::StateMachine(DomainError::NoActiveTask))
    }

    /// Record a loop error on the task and keep its snapshot for inspection.
    fn fail_run(&self, error: LoopError, started_at: Instant) -> LoopResult {
        let message = error.to_string();
        warn!(
            error = %message,
            state = %self.machine.state(),
            "Supervisor loop failed"
        );
        self.persist_snapshot();
        if let Err(e) = self.machine.fail(message.clone()) {
            debug!(error = %e, "Task already terminal; failure not recorded");
        }
        self.persist_snapshot();
        self.build_result(started_at, Some(message))
    }

    fn persist_snapshot(&self) {
        save_snapshot(&self.machine, self.persistence.as_ref());
    }

    fn build_result(&self, started_at: Instant, error: Option<String>) -> LoopResult {
        let final_state = self.machine.state();
        let (task_id, plan, execution_results, verification, iterations, task_error) =
            match self.machine.task_context() {
                Some(task) => (
                    Some(task.id),
                    task.plan,
                    task.execution_results,
                    task.verification,
                    task.iteration,
                    task.error,
                ),
                None => (None, None, None, None, 0, None),
            };

        LoopResult {
            success: final_state == SupervisorState::Complete,
            final_state,
            task_id,
            plan,
            execution_results,
            verification,
            iterations,
            duration_ms: u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            error: error.or(task_error),
        }
    }

    // ==================== Timers ====================

    fn spawn_timers(
        &self,
        token: &CancellationToken,
        started_at: Instant,
    ) -> Vec<JoinHandle<()>> {
        let mut ticks = Vec::new();
        if let Some(period) = self.config.progress_interval {
            let machine = self.machine.clone();
            let progress = self.progress.clone();
            ticks.push(spawn_periodic(token.clone(), period, move || {
                let state = machine.state();
                progress.report(
                    &machine,
                    started_at,
                    format!("{} in progress", state.display_name()),
                    None,
                );
            }));
        }

        if let Some(period) = self.config.persist_interval {
            let machine = self.machine.clone();
            let persistence = self.persistence.clone();
            ticks.push(spawn_periodic(token.clone(), period, move || {
                save_snapshot(&machine, persistence.as_ref());
            }));
        }
        ticks
    }
}

impl Drop for SupervisorLoop {
    fn drop(&mut self) {
        if let Some(token) = self.current_run().take() {
            token.cancel();
        }
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
    }
}

fn spawn_periodic<F>(token: CancellationToken, period: Duration, tick: F) -> JoinHandle<()>
where
    F: Fn() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => tick(),
            }
        }
    })
}

fn save_snapshot(machine: &StateMachine, persistence: &dyn StatePersistence) {
    if let Some(snapshot) = machine.get_persisted_state()
        && let Err(e) = persistence.save(&snapshot)
    {
        warn!(error = %e, "Failed to persist supervisor state");
    }
}

/// Any exit from PAUSED releases the loop; it re-checks the state before acting.
fn open_gate_on_leaving_pause(machine: &StateMachine, gate: Arc<PauseGate>) -> Subscription {
    machine.on_exit(SupervisorState::Paused, move |_, to| {
        if gate.open() {
            debug!(to = %to, "Left PAUSED; pause gate reopened");
        }
    })
}

fn persist_on_transition(
    machine: &StateMachine,
    persistence: Arc<dyn StatePersistence>,
) -> Subscription {
    let weak = machine.downgrade();
    machine.on_transition(move |_| {
        if let Some(machine) = weak.upgrade() {
            save_snapshot(&machine, persistence.as_ref());
        }
    })
}

fn audit_on_transition(machine: &StateMachine, audit: Arc<dyn AuditLog>) -> Subscription {
    let weak = machine.downgrade();
    machine.on_transition(move |transition| {
        let task_id = weak
            .upgrade()
            .and_then(|machine| machine.task_context())
            .map(|task| task.id);
        audit.log(AuditEvent::state_transition(json!({
            "task_id": task_id,
            "from": transition.from,
            "to": transition.to,
            "reason": transition.reason,
            "context": transition.context,
        })));
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StateMachineConfig;
    use crate::ports::audit_log::{RUN_FINISHED, RUN_STARTED, STATE_TRANSITION};
    use crate::ports::persistence::InMemoryPersistence;
    use crate::ports::phase_handler::{ExecuteHandler, PlanHandler, VerifyHandler};
    use async_trait::async_trait;
    use ralph_domain::{
        CriterionResult, ExecutionResult, StepType, TaskPlan, VerificationResult,
    };
    use std::sync::atomic::AtomicU32;

    const TASK: &str = "Add input validation";

    /// Deterministic handlers driven by a script.
    #[derive(Default)]
    struct Scripted {
        steps: usize,
        plan_delay: Option<Duration>,
        failing_verifications: AtomicU32,
        execute_error: Option<String>,
        calls: Mutex<Vec<&'static str>>,
        contexts: Mutex<Vec<PhaseContext>>,
    }

    impl Scripted {
        fn passing() -> Self {
            Self {
                steps: 3,
                ..Default::default()
            }
        }

        fn failing_verifications(self, count: u32) -> Self {
            self.failing_verifications.store(count, Ordering::SeqCst);
            self
        }

        fn record(&self, call: &'static str, context: &PhaseContext) {
            self.calls.lock().unwrap().push(call);
            self.contexts.lock().unwrap().push(context.clone());
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlanHandler for Scripted {
        async fn plan(&self, context: &PhaseContext) -> Result<TaskPlan, PhaseError> {
            self.record("plan", context);
            if let Some(delay) = self.plan_delay {
                tokio::time::sleep(delay).await;
            }
            let mut plan = TaskPlan::new()
                .with_criterion("Input is validated")
                .with_criterion("Unit tests pass");
            for i in 0..self.steps {
                plan = plan.with_step(format!("step {}", i + 1), StepType::Code);
            }
            Ok(plan)
        }
    }

    #[async_trait]
    impl ExecuteHandler for Scripted {
        async fn execute(&self, context: &PhaseContext) -> Result<Vec<ExecutionResult>, PhaseError> {
            self.record("execute", context);
            if let Some(error) = &self.execute_error {
                return Err(PhaseError::failed(error.clone()));
            }
            let steps = context.previous_plan.as_ref().map_or(0, |p| p.step_count());
            Ok((0..steps)
                .map(|i| ExecutionResult::success(i, "ok"))
                .collect())
        }
    }

    #[async_trait]
    impl VerifyHandler for Scripted {
        async fn verify(&self, context: &PhaseContext) -> Result<VerificationResult, PhaseError> {
            self.record("verify", context);
            let remaining = self.failing_verifications.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failing_verifications.store(remaining - 1, Ordering::SeqCst);
                return Ok(VerificationResult::from_criteria(vec![
                    CriterionResult::passed("Input is validated"),
                    CriterionResult::failed("Unit tests pass", "1 failure"),
                ])
                .with_suggestion("Fix the failing unit test"));
            }
            Ok(VerificationResult::from_criteria(vec![
                CriterionResult::passed("Input is validated"),
                CriterionResult::passed("Unit tests pass"),
            ]))
        }
    }

    struct RecordingAudit(Mutex<Vec<&'static str>>);

    impl AuditLog for RecordingAudit {
        fn log(&self, event: AuditEvent) {
            self.0.lock().unwrap().push(event.event_type);
        }
    }

    fn config() -> LoopConfig {
        LoopConfig::default().with_progress_interval(None)
    }

    fn supervisor(
        handler: &Arc<Scripted>,
        persistence: &Arc<InMemoryPersistence>,
        config: LoopConfig,
    ) -> SupervisorLoop {
        SupervisorLoop::new(
            PhaseHandlers::from_shared(handler.clone()),
            persistence.clone(),
            config,
        )
    }

    #[tokio::test]
    async fn test_scenario_all_phases_pass() {
        let handler = Arc::new(Scripted::passing());
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(&handler, &persistence, config());

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.final_state, SupervisorState::Complete);
        assert_eq!(result.iterations, 0);
        assert_eq!(result.plan.as_ref().map(|p| p.step_count()), Some(3));
        assert_eq!(result.execution_results.as_ref().map(Vec::len), Some(3));
        assert!(result.verification.unwrap().passed);
        assert!(result.error.is_none());
        assert_eq!(handler.calls(), vec!["plan", "execute", "verify"]);

        // Saved on every transition, cleared on completion
        assert!(persistence.save_count() >= 4);
        assert!(!persistence.exists());
        assert!(!supervisor.is_running());
    }

    #[tokio::test]
    async fn test_scenario_iteration_budget_exhausted() {
        let handler = Arc::new(Scripted::passing().failing_verifications(u32::MAX));
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(&handler, &persistence, config().with_max_iterations(2));

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);
        assert_eq!(result.iterations, 2);
        assert!(result.error.unwrap().contains("Max iterations reached (2)"));
        assert_eq!(
            handler.calls(),
            vec!["plan", "execute", "verify", "execute", "verify"]
        );

        let path: Vec<_> = supervisor.machine().history().iter().map(|t| t.to).collect();
        assert_eq!(
            path,
            vec![
                SupervisorState::Plan,
                SupervisorState::Execute,
                SupervisorState::Verify,
                SupervisorState::Iterate,
                SupervisorState::Execute,
                SupervisorState::Verify,
                SupervisorState::Failed,
            ]
        );
        assert!(persistence.exists());
    }

    #[tokio::test]
    async fn test_scenario_execute_handler_error() {
        let handler = Arc::new(Scripted {
            steps: 3,
            execute_error: Some("executor crashed".to_string()),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(&handler, &persistence, config());

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);
        assert!(result.error.as_deref().unwrap().contains("executor crashed"));

        let snapshot = persistence.load().expect("snapshot kept for inspection");
        assert_eq!(snapshot.current_state, SupervisorState::Failed);
        assert!(
            snapshot
                .task_context
                .error
                .unwrap()
                .contains("executor crashed")
        );
    }

    #[tokio::test]
    async fn test_iteration_passes_previous_verification_to_execute() {
        let handler = Arc::new(Scripted::passing().failing_verifications(1));
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(&handler, &persistence, config());

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();

        assert!(result.success);
        assert_eq!(result.iterations, 1);
        let contexts = handler.contexts.lock().unwrap();
        let second_execute = &contexts[3];
        assert_eq!(second_execute.iteration, 1);
        assert!(!second_execute.previous_verification.as_ref().unwrap().passed);

        let iterate = supervisor
            .machine()
            .history()
            .into_iter()
            .find(|t| t.to == SupervisorState::Iterate)
            .unwrap();
        assert_eq!(iterate.reason, "Fix the failing unit test");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_run_is_rejected() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = Arc::new(supervisor(&handler, &persistence, config()));

        let first = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        let second = supervisor.run("another task", Metadata::new()).await;
        assert!(matches!(second, Err(LoopError::AlreadyRunning)));

        let result = first.await.unwrap().unwrap();
        assert!(result.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_holds_loop_until_resume() {
        let handler = Arc::new(Scripted {
            steps: 2,
            plan_delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = Arc::new(supervisor(&handler, &persistence, config()));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(supervisor.pause(Some("operator break")).unwrap());
        assert!(!supervisor.pause(None).unwrap());
        assert_eq!(supervisor.machine().paused_from(), Some(SupervisorState::Plan));

        // The plan handler finishes but the loop does not advance
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(supervisor.machine().state(), SupervisorState::Paused);
        assert!(supervisor.machine().task_context().unwrap().plan.is_some());
        assert_eq!(handler.calls(), vec!["plan"]);

        assert!(supervisor.resume().unwrap());
        assert!(!supervisor.resume().unwrap());

        let result = run.await.unwrap().unwrap();
        assert!(result.success);
        let path: Vec<_> = supervisor
            .machine()
            .history()
            .iter()
            .map(|t| (t.from, t.to))
            .collect();
        assert_eq!(path[1], (SupervisorState::Plan, SupervisorState::Paused));
        assert_eq!(path[2], (SupervisorState::Paused, SupervisorState::Plan));
        assert_eq!(path[3], (SupervisorState::Plan, SupervisorState::Execute));
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_timeout_releases_waiting_loop() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let machine = StateMachineConfig::default()
            .with_timeout(SupervisorState::Paused, Duration::from_secs(2));
        let supervisor = Arc::new(supervisor(
            &handler,
            &persistence,
            config().with_machine(machine),
        ));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(supervisor.pause(None).unwrap());

        let result = tokio::time::timeout(Duration::from_secs(3600), run)
            .await
            .expect("run returns once the pause times out")
            .unwrap()
            .unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some("State PAUSED timed out after 2000ms")
        );
        assert_eq!(handler.calls(), vec!["plan"]);
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_host_fail_while_paused_ends_run() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(1)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = Arc::new(supervisor(&handler, &persistence, config()));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(500)).await;
        supervisor.pause(Some("operator break")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!run.is_finished());

        supervisor.machine().fail("aborted by operator").unwrap();
        let result = tokio::time::timeout(Duration::from_secs(60), run)
            .await
            .expect("run returns after the host fails the task")
            .unwrap()
            .unwrap();

        assert_eq!(result.final_state, SupervisorState::Failed);
        assert_eq!(result.error.as_deref(), Some("aborted by operator"));
        assert!(!supervisor.resume().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_persist_interval_saves_between_transitions() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(12)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = Arc::new(supervisor(
            &handler,
            &persistence,
            config().with_persist_interval(Some(Duration::from_secs(5))),
        ));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        let saves_after_start = persistence.save_count();
        assert!(saves_after_start >= 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(supervisor.machine().state(), SupervisorState::Plan);
        assert_eq!(supervisor.machine().history().len(), 1);
        assert_eq!(persistence.save_count(), saves_after_start + 2);

        let result = run.await.unwrap().unwrap();
        assert!(result.success);
        assert!(!persistence.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_running_handler() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(60)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = Arc::new(supervisor(&handler, &persistence, config()));

        let run = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.run(TASK, Metadata::new()).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(persistence.exists());

        supervisor.reset();
        let result = run.await.unwrap().unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Idle);
        assert!(result.error.is_some());
        assert!(!persistence.exists());
        assert!(!supervisor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_timeout_fails_run() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(5)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let machine = StateMachineConfig::default()
            .with_timeout(SupervisorState::Plan, Duration::from_secs(1));
        let supervisor = supervisor(&handler, &persistence, config().with_machine(machine));

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.final_state, SupervisorState::Failed);
        assert_eq!(
            result.error.as_deref(),
            Some("State PLAN timed out after 1000ms")
        );
        assert_eq!(handler.calls(), vec!["plan"]);
        assert!(persistence.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports() {
        let handler = Arc::new(Scripted {
            steps: 1,
            plan_delay: Some(Duration::from_secs(12)),
            ..Default::default()
        });
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(
            &handler,
            &persistence,
            config().with_progress_interval(Some(Duration::from_secs(5))),
        );

        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let _subscription = supervisor.on_progress(move |report| {
            sink.lock().unwrap().push(report.clone());
        });

        supervisor.run(TASK, Metadata::new()).await.unwrap();

        let reports = reports.lock().unwrap();
        let periodic = reports
            .iter()
            .filter(|r| r.message.ends_with("in progress"))
            .count();
        assert_eq!(periodic, 2);
        assert_eq!(reports[0].percentage, 20);
        let last = reports.last().unwrap();
        assert_eq!(last.state, SupervisorState::Complete);
        assert_eq!(last.percentage, 100);
        assert!(last.elapsed_ms >= 12_000);
    }

    #[tokio::test]
    async fn test_recover_continues_interrupted_task() {
        let persistence = Arc::new(InMemoryPersistence::new());

        // A previous process got as far as EXECUTE before dying
        {
            let crashed = supervisor(&Arc::new(Scripted::passing()), &persistence, config());
            crashed.machine().initialize(TASK, Metadata::new()).unwrap();
            crashed
                .machine()
                .set_plan(TaskPlan::new().with_step("only step", StepType::Code))
                .unwrap();
            crashed.machine().start_execution().unwrap();
        }

        let handler = Arc::new(Scripted::passing());
        let supervisor = supervisor(&handler, &persistence, config());
        assert!(supervisor.has_recoverable_state());

        let info = supervisor.recover().unwrap().unwrap();
        assert_eq!(info.state, SupervisorState::Execute);
        assert_eq!(info.description, TASK);

        let result = supervisor.run(TASK, Metadata::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.task_id, Some(info.task_id));
        assert_eq!(handler.calls(), vec!["execute", "verify"]);
    }

    #[tokio::test]
    async fn test_auto_recover_matches_description() {
        let crash = |persistence: &Arc<InMemoryPersistence>| {
            let crashed = supervisor(&Arc::new(Scripted::passing()), persistence, config());
            crashed.machine().initialize(TASK, Metadata::new()).unwrap();
            crashed.machine().task_context().unwrap().id
        };

        let same = Arc::new(InMemoryPersistence::new());
        let crashed_id = crash(&same);
        let handler = Arc::new(Scripted::passing());
        let supervisor_same = supervisor(&handler, &same, config().with_auto_recover(true));
        let resumed = supervisor_same.run(TASK, Metadata::new()).await.unwrap();
        assert!(resumed.success);
        assert_eq!(resumed.task_id, Some(crashed_id.clone()));

        let other = Arc::new(InMemoryPersistence::new());
        crash(&other);
        let handler = Arc::new(Scripted::passing());
        let supervisor_other = supervisor(&handler, &other, config().with_auto_recover(true));
        let fresh = supervisor_other
            .run("Unrelated task", Metadata::new())
            .await
            .unwrap();
        assert!(fresh.success);
        assert_ne!(fresh.task_id, Some(crashed_id));
        assert_eq!(handler.contexts.lock().unwrap()[0].task, "Unrelated task");
    }

    #[test]
    fn test_stale_or_finished_snapshot_is_not_recovered() {
        let persistence = Arc::new(InMemoryPersistence::new());
        let handler = Arc::new(Scripted::passing());
        let supervisor = supervisor(&handler, &persistence, config());

        supervisor.machine().initialize(TASK, Metadata::new()).unwrap();
        let mut snapshot = supervisor.machine().get_persisted_state().unwrap();
        supervisor.machine().reset();

        snapshot.persisted_at = chrono::Utc::now() - chrono::Duration::hours(30);
        persistence.save(&snapshot).unwrap();
        assert!(!supervisor.has_recoverable_state());
        assert!(supervisor.recover().unwrap().is_none());
        assert!(supervisor.recovery_info().unwrap().stale);

        snapshot.persisted_at = chrono::Utc::now();
        snapshot.current_state = SupervisorState::Failed;
        persistence.save(&snapshot).unwrap();
        assert!(!supervisor.has_recoverable_state());

        supervisor.discard_recovery().unwrap();
        assert!(supervisor.recovery_info().is_none());
    }

    #[tokio::test]
    async fn test_audit_events() {
        let handler = Arc::new(Scripted::passing());
        let persistence = Arc::new(InMemoryPersistence::new());
        let audit = Arc::new(RecordingAudit(Mutex::new(Vec::new())));
        let supervisor =
            supervisor(&handler, &persistence, config()).with_audit_log(audit.clone());

        supervisor.run(TASK, Metadata::new()).await.unwrap();

        let events = audit.0.lock().unwrap();
        assert_eq!(events.first(), Some(&STATE_TRANSITION));
        assert_eq!(events.last(), Some(&RUN_FINISHED));
        assert!(events.contains(&RUN_STARTED));
        assert_eq!(
            events.iter().filter(|e| **e == STATE_TRANSITION).count(),
            supervisor.machine().history().len()
        );
    }

    #[tokio::test]
    async fn test_run_again_after_terminal_starts_fresh_task() {
        let handler = Arc::new(Scripted::passing().failing_verifications(u32::MAX));
        let persistence = Arc::new(InMemoryPersistence::new());
        let supervisor = supervisor(&handler, &persistence, config().with_max_iterations(1));

        let first = supervisor.run(TASK, Metadata::new()).await.unwrap();
        assert_eq!(first.final_state, SupervisorState::Failed);

        handler.failing_verifications.store(0, Ordering::SeqCst);
        let second = supervisor.run(TASK, Metadata::new()).await.unwrap();
        assert!(second.success);
        assert_ne!(first.task_id, second.task_id);
    }
}

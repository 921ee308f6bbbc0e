//! Supervisor state machine
//!
//! Owns the single in-flight [`TaskContext`], its transition history and
//! the per-state timeout timer. Every operation is validated against the
//! [transition table](ralph_domain::supervisor::transition_table) before
//! anything is mutated.
//!
//! Each transition runs the same sequence:
//!
//! 1. cancel the pending timeout
//! 2. exit callbacks for the old state `(old, new)`
//! 3. flip state, append the [`StateTransition`] to history
//! 4. entry callbacks for the new state `(new, &context)`
//! 5. transition callbacks `(&transition)`
//! 6. arm the timeout configured for the new state
//!
//! Transitions are serialized. Callbacks run outside the state lock, so
//! they may query the machine, but they must not start another transition
//! on the same machine.

pub mod observers;
mod timeout;

pub use observers::{EnterCallback, ExitCallback, Subscription, TransitionCallback};

use crate::config::StateMachineConfig;
use observers::Observers;
use ralph_domain::supervisor::transition_table;
use ralph_domain::{
    DomainError, ExecutionResult, Metadata, PersistedState, StateTransition, SupervisorState,
    TaskContext, TaskPlan, TransitionContext, VerificationResult, last_paused_from,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

struct MachineInner {
    state: SupervisorState,
    task: Option<TaskContext>,
    history: Vec<StateTransition>,
    state_entered_at: Instant,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every state change; a timer only fires for its own generation.
    generation: u64,
}

impl MachineInner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    config: StateMachineConfig,
    inner: Mutex<MachineInner>,
    transition_guard: Mutex<()>,
    observers: Observers,
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Ok(inner) = self.inner.get_mut() {
            inner.cancel_timer();
        }
    }
}

/// Handle to a supervisor state machine.
///
/// Cloning is cheap; all clones drive the same machine.
#[derive(Clone)]
pub struct StateMachine {
    shared: Arc<Shared>,
}

/// Non-owning handle, for callbacks and timers that must not keep the machine alive.
#[derive(Clone)]
pub struct WeakStateMachine {
    shared: Weak<Shared>,
}

impl WeakStateMachine {
    pub fn upgrade(&self) -> Option<StateMachine> {
        self.shared.upgrade().map(|shared| StateMachine { shared })
    }
}

impl std::fmt::Debug for StateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateMachine")
            .field("state", &self.state())
            .field("iteration", &self.iteration())
            .finish()
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default())
    }
}

impl StateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                inner: Mutex::new(MachineInner {
                    state: SupervisorState::Idle,
                    task: None,
                    history: Vec::new(),
                    state_entered_at: Instant::now(),
                    timer: None,
                    generation: 0,
                }),
                transition_guard: Mutex::new(()),
                observers: Observers::new(),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakStateMachine {
        WeakStateMachine {
            shared: Arc::downgrade(&self.shared),
        }
    }

    pub fn config(&self) -> &StateMachineConfig {
        &self.shared.config
    }

    fn inner(&self) -> MutexGuard<'_, MachineInner> {
        self.shared.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.shared
            .transition_guard
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    // ==================== Queries ====================

    pub fn state(&self) -> SupervisorState {
        self.inner().state
    }

    pub fn task_context(&self) -> Option<TaskContext> {
        self.inner().task.clone()
    }

    pub fn history(&self) -> Vec<StateTransition> {
        self.inner().history.clone()
    }

    pub fn iteration(&self) -> u32 {
        self.inner().task.as_ref().map_or(0, |t| t.iteration)
    }

    /// While PAUSED only the paused-from state and FAILED are reachable.
    pub fn can_transition_to(&self, target: SupervisorState) -> bool {
        let inner = self.inner();
        match inner.state {
            SupervisorState::Paused => {
                target == SupervisorState::Failed
                    || last_paused_from(&inner.history) == Some(target)
            }
            state => transition_table::can_transition(state, target),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// The state to return to on resume, while paused.
    pub fn paused_from(&self) -> Option<SupervisorState> {
        let inner = self.inner();
        if inner.state != SupervisorState::Paused {
            return None;
        }
        last_paused_from(&inner.history)
    }

    pub fn time_in_current_state(&self) -> Duration {
        self.inner().state_entered_at.elapsed()
    }

    // ==================== Subscriptions ====================

    pub fn on_enter<F>(&self, state: SupervisorState, callback: F) -> Subscription
    where
        F: Fn(SupervisorState, &TransitionContext) + Send + Sync + 'static,
    {
        self.shared.observers.enter.add(state, Arc::new(callback))
    }

    pub fn on_exit<F>(&self, state: SupervisorState, callback: F) -> Subscription
    where
        F: Fn(SupervisorState, SupervisorState) + Send + Sync + 'static,
    {
        self.shared.observers.exit.add(state, Arc::new(callback))
    }

    pub fn on_transition<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StateTransition) + Send + Sync + 'static,
    {
        self.shared.observers.transition.add((), Arc::new(callback))
    }

    // ==================== Transitions ====================

    /// Create the task and move IDLE -> PLAN.
    pub fn initialize(
        &self,
        description: impl Into<String>,
        metadata: Metadata,
    ) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        let from = self.state();
        if from != SupervisorState::Idle {
            return Err(DomainError::InvalidTransition {
                from,
                to: SupervisorState::Plan,
            });
        }

        let task = TaskContext::new(description, self.shared.config.max_iterations, metadata);
        info!(task_id = %task.id, description = %task.description, "Task initialized");
        self.inner().task = Some(task);

        let result = self.apply(
            SupervisorState::Plan,
            "Task initialized",
            TransitionContext::default(),
            |_| {},
        );
        if result.is_err() {
            self.inner().task = None;
        }
        result
    }

    /// PLAN or ITERATE -> EXECUTE.
    pub fn start_execution(&self) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        self.expect_state(
            &[SupervisorState::Plan, SupervisorState::Iterate],
            SupervisorState::Execute,
        )?;
        self.apply(
            SupervisorState::Execute,
            "Starting execution",
            TransitionContext::default(),
            |_| {},
        )
    }

    /// EXECUTE -> VERIFY.
    pub fn start_verification(&self) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        self.expect_state(&[SupervisorState::Execute], SupervisorState::Verify)?;
        self.apply(
            SupervisorState::Verify,
            "Starting verification",
            TransitionContext::default(),
            |_| {},
        )
    }

    /// VERIFY -> COMPLETE.
    pub fn complete(&self) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        self.expect_state(&[SupervisorState::Verify], SupervisorState::Complete)?;
        self.apply(
            SupervisorState::Complete,
            "Verification passed",
            TransitionContext::default(),
            |_| {},
        )
    }

    /// VERIFY -> ITERATE, or VERIFY -> FAILED once the iteration budget is used up.
    ///
    /// The iteration counter is incremented before the budget check, so the
    /// failing call is counted too.
    pub fn iterate(&self, reason: impl Into<String>) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        self.expect_state(&[SupervisorState::Verify], SupervisorState::Iterate)?;

        let (iteration, max_iterations, exhausted) = {
            let mut inner = self.inner();
            let task = inner.task.as_mut().ok_or(DomainError::NoActiveTask)?;
            task.iteration += 1;
            (task.iteration, task.max_iterations, task.iterations_exhausted())
        };

        if exhausted {
            let reason = format!("Max iterations reached ({})", max_iterations);
            info!(iteration, max_iterations, "Iteration budget exhausted");
            return self.apply_failure(reason);
        }

        debug!(iteration, max_iterations, "Iterating");
        self.apply(
            SupervisorState::Iterate,
            reason,
            TransitionContext::default(),
            |_| {},
        )
    }

    /// Any state whose table row allows FAILED -> FAILED, recording `reason` as the task error.
    pub fn fail(&self, reason: impl Into<String>) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        self.apply_failure(reason.into())
    }

    /// Pausable state -> PAUSED, remembering where to resume.
    pub fn pause(&self, reason: Option<&str>) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        let from = self.state();
        if !transition_table::is_pausable(from) {
            return Err(DomainError::InvalidTransition {
                from,
                to: SupervisorState::Paused,
            });
        }
        self.apply(
            SupervisorState::Paused,
            reason.unwrap_or("Paused"),
            TransitionContext::paused_from(from),
            |_| {},
        )
    }

    /// PAUSED -> the state recorded by the most recent pause.
    pub fn resume(&self) -> Result<StateTransition, DomainError> {
        let _guard = self.guard();
        let target = {
            let inner = self.inner();
            if inner.state != SupervisorState::Paused {
                return Err(DomainError::NotPaused(inner.state));
            }
            last_paused_from(&inner.history).ok_or(DomainError::MissingPausedFrom)?
        };
        self.apply(target, "Resumed", TransitionContext::default(), |_| {})
    }

    /// Back to IDLE from anywhere: discards the task and history, cancels the timer.
    ///
    /// No callbacks fire; this abandons the task rather than transitioning it.
    pub fn reset(&self) {
        let _guard = self.guard();
        let mut inner = self.inner();
        inner.cancel_timer();
        inner.generation += 1;
        if let Some(task) = &inner.task {
            info!(task_id = %task.id, state = %inner.state, "State machine reset");
        }
        inner.state = SupervisorState::Idle;
        inner.task = None;
        inner.history.clear();
        inner.state_entered_at = Instant::now();
    }

    // ==================== Result Storage ====================

    pub fn set_plan(&self, plan: TaskPlan) -> Result<(), DomainError> {
        self.update_task(|task| task.plan = Some(plan))
    }

    pub fn set_execution_results(&self, results: Vec<ExecutionResult>) -> Result<(), DomainError> {
        self.update_task(|task| task.execution_results = Some(results))
    }

    pub fn set_verification(&self, verification: VerificationResult) -> Result<(), DomainError> {
        self.update_task(|task| task.verification = Some(verification))
    }

    fn update_task(&self, f: impl FnOnce(&mut TaskContext)) -> Result<(), DomainError> {
        let mut inner = self.inner();
        let task = inner.task.as_mut().ok_or(DomainError::NoActiveTask)?;
        f(task);
        task.touch();
        Ok(())
    }

    // ==================== Recovery ====================

    /// Snapshot of the active task, or `None` when idle.
    pub fn get_persisted_state(&self) -> Option<PersistedState> {
        let inner = self.inner();
        inner
            .task
            .clone()
            .map(|task| PersistedState::new(task, inner.state, inner.history.clone()))
    }

    /// Install a snapshot verbatim and re-arm the timeout for its state.
    pub fn restore_from_persisted_state(&self, snapshot: PersistedState) {
        let _guard = self.guard();
        let state = snapshot.current_state;
        let generation = {
            let mut inner = self.inner();
            inner.cancel_timer();
            inner.generation += 1;
            inner.state = state;
            inner.task = Some(snapshot.task_context);
            inner.history = snapshot.state_history;
            inner.state_entered_at = Instant::now();
            inner.generation
        };
        info!(state = %state, "State restored from snapshot");
        self.arm_timeout(state, generation);
    }

    // ==================== Internals ====================

    fn expect_state(
        &self,
        allowed: &[SupervisorState],
        to: SupervisorState,
    ) -> Result<(), DomainError> {
        let from = self.state();
        if allowed.contains(&from) {
            Ok(())
        } else {
            Err(DomainError::InvalidTransition { from, to })
        }
    }

    fn apply_failure(&self, reason: String) -> Result<StateTransition, DomainError> {
        let error = reason.clone();
        self.apply(
            SupervisorState::Failed,
            reason,
            TransitionContext::default(),
            move |task| task.error = Some(error),
        )
    }

    /// Runs one transition. The caller holds the transition guard.
    fn apply(
        &self,
        to: SupervisorState,
        reason: impl Into<String>,
        context: TransitionContext,
        mutate: impl FnOnce(&mut TaskContext),
    ) -> Result<StateTransition, DomainError> {
        let from = {
            let mut inner = self.inner();
            let from = inner.state;
            if !transition_table::can_transition(from, to) {
                return Err(DomainError::InvalidTransition { from, to });
            }
            inner.cancel_timer();
            inner.generation += 1;
            from
        };

        let observers = &self.shared.observers;
        for callback in observers.exit.matching(&from) {
            callback(from, to);
        }

        let transition = StateTransition::new(from, to, reason, context);
        let generation = {
            let mut inner = self.inner();
            inner.state = to;
            inner.history.push(transition.clone());
            inner.state_entered_at = Instant::now();
            if let Some(task) = inner.task.as_mut() {
                mutate(task);
                task.touch();
            }
            inner.generation
        };

        info!(
            from = %from,
            to = %to,
            reason = %transition.reason,
            "State transition"
        );

        for callback in observers.enter.matching(&to) {
            callback(to, &transition.context);
        }
        for callback in observers.transition.matching(&()) {
            callback(&transition);
        }

        self.arm_timeout(to, generation);
        Ok(transition)
    }

    /// Fail the task if it is still in `state` at `generation`.
    fn fail_on_timeout(&self, state: SupervisorState, generation: u64, after: Duration) {
        let _guard = self.guard();
        {
            let inner = self.inner();
            if inner.state != state || inner.generation != generation {
                debug!(state = %state, "Stale timeout ignored");
                return;
            }
        }
        let reason = format!("State {} timed out after {}ms", state, after.as_millis());
        if let Err(e) = self.apply_failure(reason) {
            debug!(error = %e, "Timeout could not fail the task");
        }
    }
}

//! Decision engine: turns phase evaluations into control decisions.
//!
//! The engine never fails. Every evaluation produces a decision (even a
//! low-confidence default) and every decision is appended to an in-memory
//! log that callers can query, confirm or override.
//!
//! Retry counters are keyed by phase, not by task: share one engine across
//! tasks only if a shared retry budget is intended, and call
//! [`DecisionEngine::reset_retries`] when a new task starts.

use super::config::DecisionConfig;
use super::evaluation::PhaseEvaluation;
use super::outcome::{
    DecisionLogEntry, DecisionOutcome, DecisionOverride, DecisionResult, DecisionStatistics,
};
use crate::core::string::join_or;
use crate::supervisor::state::SupervisorState;
use crate::supervisor::transition_table::normal_successor;
use crate::supervisor::value_objects::{ExecutionResult, VerificationResult};
use chrono::Utc;
use std::collections::HashMap;

/// Non-VERIFY phases only continue on partial success at or above this rate,
/// independent of the configured partial band.
const NON_VERIFY_PARTIAL_FLOOR: f64 = 0.7;

/// The outcome selected for an evaluation, before it is logged.
struct Selection {
    outcome: DecisionOutcome,
    confidence: f64,
    reason: String,
    next_state: Option<SupervisorState>,
    retry_attempt: Option<u32>,
}

/// Stateless evaluation policy plus per-phase retry counters and a decision log.
#[derive(Debug, Clone, Default)]
pub struct DecisionEngine {
    config: DecisionConfig,
    retry_counts: HashMap<SupervisorState, u32>,
    log: Vec<DecisionLogEntry>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig) -> Self {
        Self {
            config,
            retry_counts: HashMap::new(),
            log: Vec::new(),
        }
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    // ==================== Evaluation Entry Points ====================

    /// Decide on the planning phase.
    pub fn evaluate_plan(&mut self, plan_generated: bool, step_count: usize) -> DecisionResult {
        let evaluation = PhaseEvaluation::for_plan(plan_generated, step_count, &self.config);
        self.decide(evaluation)
    }

    /// Decide on the execution phase.
    pub fn evaluate_execution(&mut self, results: &[ExecutionResult]) -> DecisionResult {
        let evaluation = PhaseEvaluation::for_execution(results, &self.config);
        self.decide(evaluation)
    }

    /// Decide on the verification phase.
    pub fn evaluate_verification(&mut self, result: &VerificationResult) -> DecisionResult {
        let evaluation = PhaseEvaluation::for_verification(result, &self.config);
        self.decide(evaluation)
    }

    /// Shared decision function, in priority order:
    ///
    /// 1. critical failures over the limit → ABORT (0.95)
    /// 2. fully successful → COMPLETE for VERIFY, else CONTINUE (0.95)
    /// 3. partial band → ITERATE for VERIFY (0.7); CONTINUE elsewhere if rate ≥ 0.7 (0.6)
    /// 4. auto-retry budget left, recoverable-only failures → RETRY (0.7)
    /// 5. VERIFY → ITERATE (0.8)
    /// 6. retry budget spent → ABORT (0.9)
    /// 7. otherwise → ITERATE (0.5)
    pub fn decide(&mut self, evaluation: PhaseEvaluation) -> DecisionResult {
        let selection = self.select(&evaluation);
        let log_id = uuid::Uuid::new_v4().to_string();

        let result = DecisionResult {
            log_id: log_id.clone(),
            outcome: selection.outcome,
            confidence: selection.confidence,
            reason: selection.reason,
            suggested_next_state: selection.next_state,
            retry_attempt: selection.retry_attempt,
            requires_confirmation: self.config.requires_confirmation(selection.outcome),
            below_confidence_threshold: selection.confidence < self.config.confidence_threshold,
            evaluation: evaluation.clone(),
        };

        self.log.push(DecisionLogEntry {
            id: log_id,
            timestamp: Utc::now(),
            phase: evaluation.phase,
            evaluation,
            decision: result.clone(),
            confirmed: false,
            override_info: None,
        });

        result
    }

    fn select(&mut self, evaluation: &PhaseEvaluation) -> Selection {
        let config = &self.config;
        let phase = evaluation.phase;
        let is_verify = phase == SupervisorState::Verify;
        let rate_pct = evaluation.success_rate * 100.0;

        if evaluation.critical_failures.len() > config.max_critical_failures {
            return Selection {
                outcome: DecisionOutcome::Abort,
                confidence: 0.95,
                reason: format!(
                    "{} critical failure(s) exceed the limit of {}: {}",
                    evaluation.critical_failures.len(),
                    config.max_critical_failures,
                    evaluation.critical_failures.join("; ")
                ),
                next_state: Some(SupervisorState::Failed),
                retry_attempt: None,
            };
        }

        if evaluation.success {
            let outcome = if is_verify {
                DecisionOutcome::Complete
            } else {
                DecisionOutcome::Continue
            };
            return Selection {
                outcome,
                confidence: 0.95,
                reason: format!("{} succeeded ({:.0}% success rate)", phase, rate_pct),
                next_state: normal_successor(phase),
                retry_attempt: None,
            };
        }

        if config.allow_partial_success && evaluation.partial_success {
            if is_verify {
                return Selection {
                    outcome: DecisionOutcome::Iterate,
                    confidence: 0.7,
                    reason: format!(
                        "Partial verification success ({:.0}%); iterating to address: {}",
                        rate_pct,
                        join_or(&evaluation.recoverable_failures, "remaining criteria")
                    ),
                    next_state: Some(SupervisorState::Iterate),
                    retry_attempt: None,
                };
            }
            if evaluation.success_rate >= NON_VERIFY_PARTIAL_FLOOR {
                return Selection {
                    outcome: DecisionOutcome::Continue,
                    confidence: 0.6,
                    reason: format!(
                        "Partial {} success ({:.0}%) is acceptable; continuing",
                        phase, rate_pct
                    ),
                    next_state: normal_successor(phase),
                    retry_attempt: None,
                };
            }
        }

        let retries = self.retry_count(phase);
        if config.auto_retry
            && retries < config.max_retries
            && !evaluation.recoverable_failures.is_empty()
            && !evaluation.has_critical_failures()
        {
            let attempt = retries + 1;
            let max_retries = config.max_retries;
            self.retry_counts.insert(phase, attempt);
            return Selection {
                outcome: DecisionOutcome::Retry,
                confidence: 0.7,
                reason: format!(
                    "Retrying {} (attempt {}/{}): {}",
                    phase,
                    attempt,
                    max_retries,
                    evaluation.recoverable_failures.join("; ")
                ),
                next_state: Some(phase),
                retry_attempt: Some(attempt),
            };
        }

        if is_verify {
            return Selection {
                outcome: DecisionOutcome::Iterate,
                confidence: 0.8,
                reason: format!(
                    "Verification failed: {}",
                    join_or(&evaluation.recoverable_failures, "criteria not met")
                ),
                next_state: Some(SupervisorState::Iterate),
                retry_attempt: None,
            };
        }

        if retries >= config.max_retries {
            return Selection {
                outcome: DecisionOutcome::Abort,
                confidence: 0.9,
                reason: format!("{} exhausted its {} retries", phase, config.max_retries),
                next_state: Some(SupervisorState::Failed),
                retry_attempt: None,
            };
        }

        Selection {
            outcome: DecisionOutcome::Iterate,
            confidence: 0.5,
            reason: format!(
                "Uncertain {} outcome ({:.0}% success); iterating conservatively",
                phase, rate_pct
            ),
            next_state: Some(SupervisorState::Iterate),
            retry_attempt: None,
        }
    }

    // ==================== Retry Bookkeeping ====================

    /// Retries already consumed by `phase`.
    pub fn retry_count(&self, phase: SupervisorState) -> u32 {
        self.retry_counts.get(&phase).copied().unwrap_or(0)
    }

    /// Reset all retry counters (start of a new task lifecycle).
    pub fn reset_retries(&mut self) {
        self.retry_counts.clear();
    }

    // ==================== Decision Log ====================

    /// All decisions in evaluation order.
    pub fn decision_log(&self) -> &[DecisionLogEntry] {
        &self.log
    }

    pub fn decisions_for_phase(&self, phase: SupervisorState) -> Vec<&DecisionLogEntry> {
        self.log.iter().filter(|e| e.phase == phase).collect()
    }

    /// Decisions flagged for confirmation that nobody has confirmed yet.
    pub fn pending_confirmations(&self) -> Vec<&DecisionLogEntry> {
        self.log
            .iter()
            .filter(|e| e.is_pending_confirmation())
            .collect()
    }

    /// Accept a logged decision as-is. Returns `false` for an unknown id.
    pub fn confirm_decision(&mut self, log_id: &str) -> bool {
        match self.log.iter_mut().find(|e| e.id == log_id) {
            Some(entry) => {
                entry.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Replace a logged decision's outcome.
    ///
    /// Marks the entry confirmed and returns a new decision with confidence
    /// 1.0 carrying the override reason. Returns `None` for an unknown id.
    pub fn override_decision(
        &mut self,
        log_id: &str,
        outcome: DecisionOutcome,
        reason: impl Into<String>,
    ) -> Option<DecisionResult> {
        let reason = reason.into();
        let entry = self.log.iter_mut().find(|e| e.id == log_id)?;

        entry.confirmed = true;
        entry.override_info = Some(DecisionOverride {
            outcome,
            reason: reason.clone(),
            timestamp: Utc::now(),
        });

        Some(DecisionResult {
            log_id: entry.id.clone(),
            outcome,
            confidence: 1.0,
            reason,
            evaluation: entry.evaluation.clone(),
            suggested_next_state: outcome.target_state(entry.phase),
            retry_attempt: None,
            requires_confirmation: false,
            below_confidence_threshold: false,
        })
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    pub fn statistics(&self) -> DecisionStatistics {
        let mut stats = DecisionStatistics {
            total: self.log.len(),
            ..Default::default()
        };
        let mut confidence_sum = 0.0;
        for entry in &self.log {
            *stats.by_outcome.entry(entry.decision.outcome).or_insert(0) += 1;
            confidence_sum += entry.decision.confidence;
            if entry.was_overridden() {
                stats.overridden += 1;
            }
            if entry.is_pending_confirmation() {
                stats.pending_confirmation += 1;
            }
        }
        if stats.total > 0 {
            stats.average_confidence = confidence_sum / stats.total as f64;
        }
        stats
    }
}

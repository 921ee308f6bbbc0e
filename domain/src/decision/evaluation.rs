//! Phase evaluation: summarizes one phase's raw results.
//!
//! Failures are split into **critical** (non-recoverable, pushes towards
//! ABORT) and **recoverable** (eligible for RETRY/ITERATE):
//!
//! - Execution errors are critical when their text matches a compiler /
//!   runtime fault pattern (syntax, type, compile, missing module, null
//!   reference, permission, out-of-memory, stack overflow, segfault).
//! - Verification criteria are critical when their description names a
//!   build, type-check, parse or security concern.

use super::config::DecisionConfig;
use crate::core::string::truncate;
use crate::supervisor::state::SupervisorState;
use crate::supervisor::value_objects::{ExecutionResult, VerificationResult};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Maximum length of an error excerpt quoted in a failure or suggestion.
const EXCERPT_LEN: usize = 160;

static CRITICAL_ERROR_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)syntax\s*error",
        r"(?i)type\s*error",
        r"(?i)compil(e|ation)\s*(error|failed|failure)",
        r"(?i)cannot\s+find\s+module|module\s+not\s+found|no\s+module\s+named",
        r"(?i)null\s*(pointer|reference)|cannot\s+read\s+propert(y|ies)\s+of\s+(null|undefined)",
        r"(?i)permission\s+denied|eacces|eperm",
        r"(?i)out\s+of\s+memory|enomem",
        r"(?i)stack\s*overflow|maximum\s+call\s+stack",
        r"(?i)segmentation\s+fault|segfault|sigsegv",
    ])
    .unwrap_or_else(|_| RegexSet::empty())
});

/// Keywords that make a failed verification criterion critical.
pub const CRITICAL_CRITERION_KEYWORDS: [&str; 8] = [
    "build",
    "compile",
    "type check",
    "typecheck",
    "syntax",
    "parse",
    "security",
    "critical",
];

/// Whether an execution error message describes a non-recoverable fault.
pub fn is_critical_error(error: &str) -> bool {
    CRITICAL_ERROR_PATTERNS.is_match(error)
}

/// Whether a failed criterion's text names a critical concern.
pub fn is_critical_criterion(criterion: &str) -> bool {
    let lowered = criterion.to_lowercase();
    CRITICAL_CRITERION_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Suggest how to recover from a failed execution step.
pub fn suggestion_for_error(step_index: usize, error: &str) -> String {
    let lowered = error.to_lowercase();
    let step = step_index + 1;
    if lowered.contains("timeout") || lowered.contains("timed out") {
        format!("Step {step} timed out; split it into smaller steps or allow more time")
    } else if lowered.contains("not found") || lowered.contains("no such file") {
        format!("Step {step} referenced a missing file or symbol; verify paths and names")
    } else if lowered.contains("test") || lowered.contains("assert") {
        format!("Step {step} has failing tests; inspect the assertion output and fix the code")
    } else if lowered.contains("network")
        || lowered.contains("connection")
        || lowered.contains("rate limit")
    {
        format!("Step {step} hit a transient network error; retry it")
    } else {
        format!("Retry step {step}: {}", truncate(error, EXCERPT_LEN))
    }
}

/// Summary of one phase's results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEvaluation {
    /// Phase the results came from
    pub phase: SupervisorState,
    /// Success rate at or above `min_success_rate`
    pub success: bool,
    /// Success rate in the partial band
    pub partial_success: bool,
    /// passed / total, 0.0 - 1.0
    pub success_rate: f64,
    pub passed: usize,
    pub total: usize,
    pub critical_failures: Vec<String>,
    pub recoverable_failures: Vec<String>,
    pub suggestions: Vec<String>,
}

impl PhaseEvaluation {
    fn with_rate(phase: SupervisorState, success_rate: f64, config: &DecisionConfig) -> Self {
        let success = success_rate >= config.min_success_rate;
        Self {
            phase,
            success,
            partial_success: !success && success_rate >= config.partial_success_rate,
            success_rate,
            passed: 0,
            total: 0,
            critical_failures: Vec::new(),
            recoverable_failures: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    /// Binary evaluation of the planning phase.
    ///
    /// A plan failure is always critical: there is nothing to retry against.
    pub fn for_plan(plan_generated: bool, step_count: usize, config: &DecisionConfig) -> Self {
        let ok = plan_generated && step_count > 0;
        let mut evaluation =
            Self::with_rate(SupervisorState::Plan, if ok { 1.0 } else { 0.0 }, config);
        evaluation.success = ok;
        evaluation.partial_success = false;
        evaluation.total = 1;
        evaluation.passed = usize::from(ok);
        if !plan_generated {
            evaluation
                .critical_failures
                .push("Plan generation failed".to_string());
        } else if step_count == 0 {
            evaluation
                .critical_failures
                .push("Plan contains no steps".to_string());
        }
        evaluation
    }

    /// Evaluation of the execution phase from per-step results.
    pub fn for_execution(results: &[ExecutionResult], config: &DecisionConfig) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.success).count();
        let rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64
        };

        let mut evaluation = Self::with_rate(SupervisorState::Execute, rate, config);
        evaluation.total = total;
        evaluation.passed = passed;

        if total == 0 {
            evaluation
                .recoverable_failures
                .push("No execution results were produced".to_string());
            evaluation
                .suggestions
                .push("Re-run execution; no step reported a result".to_string());
            return evaluation;
        }

        for result in results.iter().filter(|r| !r.success) {
            let error = result.error.as_deref().unwrap_or("Unknown error");
            let failure = format!(
                "Step {}: {}",
                result.step_index + 1,
                truncate(error, EXCERPT_LEN)
            );
            if is_critical_error(error) {
                evaluation.critical_failures.push(failure);
            } else {
                evaluation.recoverable_failures.push(failure);
                evaluation
                    .suggestions
                    .push(suggestion_for_error(result.step_index, error));
            }
        }
        evaluation
    }

    /// Evaluation of the verification phase from per-criterion results.
    pub fn for_verification(result: &VerificationResult, config: &DecisionConfig) -> Self {
        let (passed, total) = result.counts();
        let rate = if total == 0 {
            if result.passed { 1.0 } else { 0.0 }
        } else {
            passed as f64 / total as f64
        };

        let mut evaluation = Self::with_rate(SupervisorState::Verify, rate, config);
        evaluation.total = total;
        evaluation.passed = passed;
        evaluation.suggestions.extend(result.suggestions.iter().cloned());

        if total == 0 && !result.passed {
            evaluation
                .recoverable_failures
                .push("Verification failed without criterion details".to_string());
        }

        for criterion in result.criteria.iter().filter(|c| !c.passed) {
            let failure = match &criterion.details {
                Some(details) => format!(
                    "{}: {}",
                    criterion.criterion,
                    truncate(details, EXCERPT_LEN)
                ),
                None => criterion.criterion.clone(),
            };
            if is_critical_criterion(&criterion.criterion) {
                evaluation.critical_failures.push(failure);
            } else {
                evaluation
                    .suggestions
                    .push(format!("Address unmet criterion: {}", criterion.criterion));
                evaluation.recoverable_failures.push(failure);
            }
        }
        evaluation
    }

    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.passed)
    }

    pub fn has_critical_failures(&self) -> bool {
        !self.critical_failures.is_empty()
    }
}

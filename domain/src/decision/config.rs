//! Decision engine thresholds and toggles.

use super::outcome::DecisionOutcome;
use serde::{Deserialize, Serialize};

/// Thresholds used to turn a [`PhaseEvaluation`](super::PhaseEvaluation) into a decision.
///
/// | Field                   | Default   | Meaning |
/// |-------------------------|-----------|---------|
/// | `min_success_rate`      | 0.8       | At or above: phase fully successful |
/// | `partial_success_rate`  | 0.5       | At or above (and below min): partial |
/// | `max_critical_failures` | 0         | Exceeding it forces ABORT |
/// | `max_retries`           | 3         | Per-phase retry budget |
/// | `confidence_threshold`  | 0.7       | Informational only |
/// | `auto_retry`            | true      | Allow RETRY outcomes |
/// | `allow_partial_success` | true      | Honour the partial band |
/// | `require_confirmation`  | `[ABORT]` | Outcomes flagged for human confirmation |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub min_success_rate: f64,
    pub partial_success_rate: f64,
    pub max_critical_failures: usize,
    pub max_retries: u32,
    pub confidence_threshold: f64,
    pub auto_retry: bool,
    pub allow_partial_success: bool,
    pub require_confirmation: Vec<DecisionOutcome>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            min_success_rate: 0.8,
            partial_success_rate: 0.5,
            max_critical_failures: 0,
            max_retries: 3,
            confidence_threshold: 0.7,
            auto_retry: true,
            allow_partial_success: true,
            require_confirmation: vec![DecisionOutcome::Abort],
        }
    }
}

impl DecisionConfig {
    // ==================== Builder Methods ====================

    pub fn with_min_success_rate(mut self, rate: f64) -> Self {
        self.min_success_rate = rate;
        self
    }

    pub fn with_partial_success_rate(mut self, rate: f64) -> Self {
        self.partial_success_rate = rate;
        self
    }

    pub fn with_max_critical_failures(mut self, max: usize) -> Self {
        self.max_critical_failures = max;
        self
    }

    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    pub fn with_auto_retry(mut self, enabled: bool) -> Self {
        self.auto_retry = enabled;
        self
    }

    pub fn with_partial_success(mut self, allowed: bool) -> Self {
        self.allow_partial_success = allowed;
        self
    }

    pub fn with_require_confirmation(mut self, outcomes: Vec<DecisionOutcome>) -> Self {
        self.require_confirmation = outcomes;
        self
    }

    /// Whether decisions with this outcome must be confirmed by the caller.
    pub fn requires_confirmation(&self, outcome: DecisionOutcome) -> bool {
        self.require_confirmation.contains(&outcome)
    }
}

//! Decision outcomes, results and the audit log entry.

use super::evaluation::PhaseEvaluation;
use crate::supervisor::state::SupervisorState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the caller should do next with a phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionOutcome {
    /// Proceed to the phase's normal successor
    Continue,
    /// Run the same phase again
    Retry,
    /// Go around the execute/verify loop again
    Iterate,
    /// The task is done
    Complete,
    /// Give up on the task
    Abort,
    /// Suspend and wait for a human
    Pause,
}

impl DecisionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionOutcome::Continue => "CONTINUE",
            DecisionOutcome::Retry => "RETRY",
            DecisionOutcome::Iterate => "ITERATE",
            DecisionOutcome::Complete => "COMPLETE",
            DecisionOutcome::Abort => "ABORT",
            DecisionOutcome::Pause => "PAUSE",
        }
    }

    /// Ordering of how good an outcome is for the task.
    ///
    /// ABORT < PAUSE < ITERATE = RETRY < CONTINUE < COMPLETE
    pub fn favorability(&self) -> u8 {
        match self {
            DecisionOutcome::Abort => 0,
            DecisionOutcome::Pause => 1,
            DecisionOutcome::Iterate | DecisionOutcome::Retry => 2,
            DecisionOutcome::Continue => 3,
            DecisionOutcome::Complete => 4,
        }
    }

    /// The supervisor state this outcome leads to when taken in `phase`.
    pub fn target_state(&self, phase: SupervisorState) -> Option<SupervisorState> {
        match self {
            DecisionOutcome::Continue => {
                crate::supervisor::transition_table::normal_successor(phase)
            }
            DecisionOutcome::Retry => Some(phase),
            DecisionOutcome::Iterate => Some(SupervisorState::Iterate),
            DecisionOutcome::Complete => Some(SupervisorState::Complete),
            DecisionOutcome::Abort => Some(SupervisorState::Failed),
            DecisionOutcome::Pause => Some(SupervisorState::Paused),
        }
    }
}

impl std::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decision over one phase evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    /// Id of the log entry recording this decision
    pub log_id: String,
    pub outcome: DecisionOutcome,
    /// 0.0 - 1.0
    pub confidence: f64,
    /// Human-readable explanation
    pub reason: String,
    pub evaluation: PhaseEvaluation,
    /// Where the supervisor should go next
    pub suggested_next_state: Option<SupervisorState>,
    /// Attempt number when `outcome` is RETRY (1-based)
    pub retry_attempt: Option<u32>,
    /// Whether the caller should confirm before acting
    pub requires_confirmation: bool,
    /// Whether `confidence` is under the configured threshold
    pub below_confidence_threshold: bool,
}

/// A human override recorded on a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOverride {
    pub outcome: DecisionOutcome,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// One entry of the in-memory decision log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionLogEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub phase: SupervisorState,
    pub evaluation: PhaseEvaluation,
    pub decision: DecisionResult,
    /// Set once the decision has been confirmed or overridden
    pub confirmed: bool,
    pub override_info: Option<DecisionOverride>,
}

impl DecisionLogEntry {
    pub fn was_overridden(&self) -> bool {
        self.override_info.is_some()
    }

    /// Waiting for a human to confirm or override.
    pub fn is_pending_confirmation(&self) -> bool {
        self.decision.requires_confirmation && !self.confirmed
    }
}

/// Aggregate view over the decision log.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecisionStatistics {
    pub total: usize,
    pub by_outcome: BTreeMap<DecisionOutcome, usize>,
    pub overridden: usize,
    pub pending_confirmation: usize,
    pub average_confidence: f64,
}

//! Supervisor value objects - immutable data exchanged with phase handlers.
//!
//! # Identifiers
//! - [`TaskId`] - Unique identifier for a supervised task
//!
//! # Metadata
//! - [`Metadata`] / [`MetadataValue`] - typed key-value map of serializable scalars
//!
//! # Phase data
//! - [`TaskPlan`] / [`PlanStep`] - output of the plan handler
//! - [`ExecutionResult`] - one per executed plan step
//! - [`VerificationResult`] / [`CriterionResult`] - output of the verify handler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Unique identifier for a supervised task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a TaskId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a new random (v4) TaskId.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T: Into<String>> From<T> for TaskId {
    fn from(s: T) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A serializable scalar stored in [`Metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        MetadataValue::Number(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Number(value as f64)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Bool(b) => write!(f, "{}", b),
            MetadataValue::Number(n) => write!(f, "{}", n),
            MetadataValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Open key-value map attached to tasks and transitions.
///
/// Ordered so the persisted form is stable.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Kind of work a plan step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Write or modify code
    #[default]
    Code,
    /// Write or run tests
    Test,
    /// Read, search, investigate
    Research,
    /// Documentation changes
    Documentation,
    /// Anything else
    Other,
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Code => "code",
            StepType::Test => "test",
            StepType::Research => "research",
            StepType::Documentation => "documentation",
            StepType::Other => "other",
        }
    }
}

/// Status of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Step is waiting to be executed
    #[default]
    Pending,
    /// Step is currently being executed
    InProgress,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
    /// Step was skipped
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

/// A single step within a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Position of the step in the plan (0-based)
    pub index: usize,
    /// What the step does
    pub description: String,
    /// Kind of work
    pub step_type: StepType,
    /// Current status
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(index: usize, description: impl Into<String>) -> Self {
        Self {
            index,
            description: description.into(),
            step_type: StepType::default(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_type(mut self, step_type: StepType) -> Self {
        self.step_type = step_type;
        self
    }
}

/// A plan: ordered steps plus free-text success criteria
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TaskPlan {
    /// Ordered list of steps
    pub steps: Vec<PlanStep>,
    /// Criteria the verifier checks
    pub success_criteria: Vec<String>,
}

impl TaskPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step, assigning it the next index.
    pub fn with_step(mut self, description: impl Into<String>, step_type: StepType) -> Self {
        let index = self.steps.len();
        self.steps
            .push(PlanStep::new(index, description).with_type(step_type));
        self
    }

    pub fn with_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.success_criteria.push(criterion.into());
        self
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Get completion progress (finished / total)
    pub fn progress(&self) -> (usize, usize) {
        let finished = self.steps.iter().filter(|s| s.status.is_terminal()).count();
        (finished, self.steps.len())
    }
}

/// Result of executing one plan step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Index of the plan step this result belongs to
    pub step_index: usize,
    /// Whether the step succeeded
    pub success: bool,
    /// Output produced by the step
    pub output: Option<String>,
    /// Error text if the step failed
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// When the step finished
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    /// Creates a successful step result with the given output.
    pub fn success(step_index: usize, output: impl Into<String>) -> Self {
        Self {
            step_index,
            success: true,
            output: Some(output.into()),
            error: None,
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Creates a failed step result with an error message.
    pub fn failure(step_index: usize, error: impl Into<String>) -> Self {
        Self {
            step_index,
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// Result for a single success criterion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    /// The criterion text
    pub criterion: String,
    /// Whether it is satisfied
    pub passed: bool,
    /// Optional explanation from the verifier
    pub details: Option<String>,
}

impl CriterionResult {
    pub fn passed(criterion: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            passed: true,
            details: None,
        }
    }

    pub fn failed(criterion: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            passed: false,
            details: Some(details.into()),
        }
    }
}

/// Output of the verify handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Overall verdict
    pub passed: bool,
    /// Per-criterion results
    pub criteria: Vec<CriterionResult>,
    /// Improvement suggestions for the next iteration
    pub suggestions: Vec<String>,
    /// When verification finished
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    /// Builds a result whose verdict is the conjunction of the criteria.
    pub fn from_criteria(criteria: Vec<CriterionResult>) -> Self {
        let passed = criteria.iter().all(|c| c.passed);
        Self {
            passed,
            criteria,
            suggestions: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// (passed, total) criteria counts
    pub fn counts(&self) -> (usize, usize) {
        let passed = self.criteria.iter().filter(|c| c.passed).count();
        (passed, self.criteria.len())
    }
}

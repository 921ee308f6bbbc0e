//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and use domain types where appropriate.

mod logging;
mod output;
mod supervisor;

pub use logging::{FileLoggingConfig, LOG_LEVELS};
pub use output::FileOutputConfig;
pub use supervisor::{FileSupervisorConfig, FileTimeoutsConfig};

use ralph_domain::{DecisionConfig, SupervisorState};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A problem found by [`FileConfig::validate`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigValidationError {
    #[error("supervisor.max_iterations must be at least 1")]
    ZeroMaxIterations,

    #[error(
        "supervisor.timeouts.{}: a timeout of 0 seconds would fail immediately",
        state.as_str().to_lowercase()
    )]
    ZeroTimeout { state: SupervisorState },

    #[error("decision.{field} must be between 0.0 and 1.0 (got {value})")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error(
        "decision.partial_success_rate ({partial}) must not exceed decision.min_success_rate ({min})"
    )]
    PartialAboveMin { partial: f64, min: f64 },

    #[error("logging.level: unknown level '{0}' (expected error, warn, info, debug or trace)")]
    UnknownLogLevel(String),

    #[error("supervisor.state_file must not be empty")]
    EmptyStateFile,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Supervisor loop settings
    pub supervisor: FileSupervisorConfig,
    /// Decision engine thresholds (uses domain type)
    pub decision: DecisionConfig,
    /// Logging settings
    pub logging: FileLoggingConfig,
    /// Output settings
    pub output: FileOutputConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();

        if self.supervisor.max_iterations == 0 {
            issues.push(ConfigValidationError::ZeroMaxIterations);
        }
        if self.supervisor.state_file.as_os_str().is_empty() {
            issues.push(ConfigValidationError::EmptyStateFile);
        }
        issues.extend(
            self.supervisor
                .timeouts
                .entries()
                .into_iter()
                .filter(|(_, secs)| *secs == 0)
                .map(|(state, _)| ConfigValidationError::ZeroTimeout { state }),
        );

        let rates = [
            ("min_success_rate", self.decision.min_success_rate),
            ("partial_success_rate", self.decision.partial_success_rate),
            ("confidence_threshold", self.decision.confidence_threshold),
        ];
        for (field, value) in rates {
            if !(0.0..=1.0).contains(&value) {
                issues.push(ConfigValidationError::RateOutOfRange { field, value });
            }
        }
        if self.decision.partial_success_rate > self.decision.min_success_rate {
            issues.push(ConfigValidationError::PartialAboveMin {
                partial: self.decision.partial_success_rate,
                min: self.decision.min_success_rate,
            });
        }

        if !self.logging.level_is_known()
            && let Some(level) = &self.logging.level
        {
            issues.push(ConfigValidationError::UnknownLogLevel(level.clone()));
        }

        issues
    }
}

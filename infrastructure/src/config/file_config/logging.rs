//! Logging configuration from TOML (`[logging]` section)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Levels accepted by `[logging] level`.
pub const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Raw logging configuration from TOML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Default log level when no `-v` flag is given
    pub level: Option<String>,
    /// Diagnostic log file (plain text)
    pub file: Option<PathBuf>,
    /// JSONL audit trail of runs and transitions
    pub audit_file: Option<PathBuf>,
}

impl FileLoggingConfig {
    /// Whether `level` names a known tracing level.
    pub fn level_is_known(&self) -> bool {
        self.level
            .as_deref()
            .is_none_or(|level| LOG_LEVELS.contains(&level.to_lowercase().as_str()))
    }
}

//! Configuration file loading for ralph-loop
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `RALPH_*` environment variables (`__` separates nested keys)
//! 2. `--config <path>` specified file
//! 3. Project root: `./ralph.toml` or `./.ralph.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/ralph-loop/config.toml`
//! 5. Default values

mod file_config;
mod loader;

pub use file_config::{
    ConfigValidationError, FileConfig, FileLoggingConfig, FileOutputConfig, FileSupervisorConfig,
    FileTimeoutsConfig, LOG_LEVELS,
};
pub use loader::{ConfigLoader, ENV_PREFIX};

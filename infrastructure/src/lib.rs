//! Infrastructure layer for ralph-loop
//!
//! This crate contains adapters that implement the ports defined
//! in the application layer: file-backed state persistence, the JSONL
//! audit log, and configuration file loading.

pub mod config;
pub mod logging;
pub mod persistence;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, FileConfig, FileLoggingConfig, FileOutputConfig,
    FileSupervisorConfig, FileTimeoutsConfig,
};
pub use logging::JsonlAuditLog;
pub use persistence::{DEFAULT_STATE_FILE, FileStatePersistence};

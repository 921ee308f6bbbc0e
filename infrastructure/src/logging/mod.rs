//! Logging infrastructure: structured audit logging.
//!
//! Provides [`JsonlAuditLog`], a JSONL file writer that implements the
//! [`AuditLog`](ralph_application::AuditLog) port.

mod jsonl_audit_log;

pub use jsonl_audit_log::JsonlAuditLog;

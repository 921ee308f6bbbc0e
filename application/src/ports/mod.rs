//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters and the host
//! application must implement.

pub mod audit_log;
pub mod persistence;
pub mod phase_handler;

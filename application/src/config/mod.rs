//! Application-level configuration.
//!
//! - [`StateMachineConfig`]: iteration budget and per-state timeouts
//! - [`LoopConfig`]: supervisor loop timers, persistence and recovery

pub mod loop_config;
pub mod state_machine_config;

pub use loop_config::LoopConfig;
pub use state_machine_config::StateMachineConfig;

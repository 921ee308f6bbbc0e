//! Use cases (application services)
//!
//! - [`run_supervisor`]: drive one task through plan, execute, verify and iterate

pub mod run_supervisor;

//! Execution control
//!
//! Orchestration of one request, the child process runner, and the watchdog.

pub mod executor;
pub mod runner;
pub mod watchdog;

//! Thin wrappers around OS process primitives.
//!
//! Process-group termination and per-child resource limits.

pub mod rlimit;
pub mod signal;

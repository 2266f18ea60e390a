//! Safety and cleanup
//!
//! Exclusive per-execution workspaces and the process-wide admission budget.

pub mod admission;
pub mod workspace;

//! Configuration
//!
//! Request/result types, engine settings, and startup validation.

pub mod engine;
pub mod types;
pub mod validator;

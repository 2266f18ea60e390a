//! Language drivers.
//!
//! The runner stays language-agnostic. Drivers write source artifacts into the
//! workspace and describe the compile/run commands for each language.

pub mod adapter;
pub mod languages;
pub mod registry;

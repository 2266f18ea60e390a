// Startup validation for operator-supplied engine configuration.
// Invalid configs fail fast with every problem listed at once.

use crate::config::engine::{EngineConfig, LimitRange};

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn validate_config(config: &EngineConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    validate_ceilings(config, &mut result);
    validate_range("timeout_ms", &config.timeout_ms, &mut result);
    validate_range("memory_mb", &config.memory_mb, &mut result);
    validate_toolchain(config, &mut result);

    result
}

fn validate_ceilings(config: &EngineConfig, result: &mut ValidationResult) {
    if config.max_concurrency == 0 {
        result.add_error("max_concurrency cannot be zero".to_string());
    }
    if config.max_output_bytes == 0 {
        result.add_error("max_output_bytes cannot be zero".to_string());
    }
    if config.max_source_chars == 0 {
        result.add_error("max_source_chars cannot be zero".to_string());
    }
    if config.debug_prefix_bytes > config.max_output_bytes {
        result.add_warning(format!(
            "debug_prefix_bytes {} exceeds max_output_bytes {}, prefix will be capped",
            config.debug_prefix_bytes, config.max_output_bytes
        ));
    }
    if config.watchdog_grace_ms == 0 {
        result.add_warning(
            "watchdog_grace_ms is zero, watchdog will race the primary deadline".to_string(),
        );
    }
    if config.workspace_root.as_os_str().is_empty() {
        result.add_error("workspace_root cannot be empty".to_string());
    }
}

fn validate_range(name: &str, range: &LimitRange, result: &mut ValidationResult) {
    if range.floor == 0 {
        result.add_error(format!("{}.floor cannot be zero", name));
    }
    if range.floor > range.ceiling {
        result.add_error(format!(
            "{}.floor {} is above ceiling {}",
            name, range.floor, range.ceiling
        ));
    }
    if range.default < range.floor || range.default > range.ceiling {
        result.add_error(format!(
            "{}.default {} is outside [{}, {}]",
            name, range.default, range.floor, range.ceiling
        ));
    }
}

fn validate_toolchain(config: &EngineConfig, result: &mut ValidationResult) {
    let tools = [
        ("python", &config.toolchain.python),
        ("node", &config.toolchain.node),
        ("javac", &config.toolchain.javac),
        ("java", &config.toolchain.java),
        ("cxx", &config.toolchain.cxx),
    ];
    for (name, value) in tools {
        if value.trim().is_empty() {
            result.add_error(format!("toolchain.{} cannot be empty", name));
        }
    }
}

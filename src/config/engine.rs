/// Engine configuration loading and limit resolution
use crate::config::types::{EngineError, RequestedLimits, ResolvedLimits, Result};
use crate::config::validator;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a JSON config file
pub const CONFIG_ENV_VAR: &str = "CODEBOX_CONFIG";

/// A `[floor, ceiling]` range with the value used when the caller is silent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitRange {
    pub default: u64,
    pub floor: u64,
    pub ceiling: u64,
}

impl LimitRange {
    pub const fn new(default: u64, floor: u64, ceiling: u64) -> Self {
        Self {
            default,
            floor,
            ceiling,
        }
    }

    /// Clamp a requested value. The result never leaves `[floor, ceiling]`.
    pub fn resolve(&self, requested: Option<u64>) -> u64 {
        requested
            .unwrap_or(self.default)
            .clamp(self.floor, self.ceiling)
    }
}

/// Toolchain binaries invoked by the drivers. Plain names are looked up on
/// the inherited `PATH`; operators may configure absolute paths instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub python: String,
    pub node: String,
    pub javac: String,
    pub java: String,
    pub cxx: String,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            python: if cfg!(windows) { "python" } else { "python3" }.to_string(),
            node: "node".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            cxx: "g++".to_string(),
        }
    }
}

/// Process-wide engine settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory under which per-execution workspaces are created
    pub workspace_root: PathBuf,
    /// Maximum executions in flight at once
    pub max_concurrency: usize,
    /// Maximum source length in characters
    pub max_source_chars: usize,
    /// Maximum stdin length in characters
    pub max_stdin_chars: usize,
    /// Captured bytes per stream
    pub max_output_bytes: usize,
    /// Wall-clock limit in milliseconds
    pub timeout_ms: LimitRange,
    /// Memory limit in megabytes
    pub memory_mb: LimitRange,
    /// Extra time the watchdog waits past the deadline before it fires
    pub watchdog_grace_ms: u64,
    /// Bytes of stdout kept for debugging when a run is killed
    pub debug_prefix_bytes: usize,
    /// RLIMIT_FSIZE applied to every child (Unix only)
    pub max_file_size_bytes: u64,
    pub toolchain: Toolchain,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("codebox-workspaces"),
            max_concurrency: 10,
            max_source_chars: 50_000,
            max_stdin_chars: 10_000,
            max_output_bytes: 512 * 1024,
            timeout_ms: LimitRange::new(5_000, 1_000, 10_000),
            memory_mb: LimitRange::new(128, 16, 128),
            watchdog_grace_ms: 500,
            debug_prefix_bytes: 1024,
            max_file_size_bytes: 16 * 1024 * 1024,
            toolchain: Toolchain::default(),
        }
    }
}

impl EngineConfig {
    /// Load a JSON config file; missing keys take their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: EngineConfig = serde_json::from_str(&content).map_err(|e| {
            EngineError::Config(format!("Failed to parse config {}: {}", path.display(), e))
        })?;
        config.validated()
    }

    /// Explicit path wins, then `CODEBOX_CONFIG`, then built-in defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(env_path) if !env_path.is_empty() => Self::from_file(Path::new(&env_path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validated(self) -> Result<Self> {
        let report = validator::validate_config(&self);
        for warning in &report.warnings {
            log::warn!("config: {}", warning);
        }
        if !report.is_valid() {
            return Err(EngineError::Config(report.errors.join("; ")));
        }
        Ok(self)
    }

    pub fn resolve_limits(&self, requested: &RequestedLimits) -> ResolvedLimits {
        ResolvedLimits {
            timeout_ms: self.timeout_ms.resolve(requested.timeout_ms),
            memory_mb: self.memory_mb.resolve(requested.memory_mb),
            max_output_bytes: self.max_output_bytes,
        }
    }
}

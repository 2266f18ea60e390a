/// Core types shared by the execution engine
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Languages with a registered driver
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
}

impl Language {
    /// Resolve a caller-supplied identifier (case-insensitive, aliases allowed)
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Some(Self::Python),
            "javascript" | "js" => Some(Self::JavaScript),
            "java" => Some(Self::Java),
            "cpp" | "c++" => Some(Self::Cpp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::Java => "java",
            Self::Cpp => "cpp",
        }
    }

    pub fn all() -> [Language; 4] {
        [Self::Python, Self::JavaScript, Self::Java, Self::Cpp]
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-requested limits. Both are optional and only ever narrow the
/// configured ceilings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestedLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
}

/// A single code execution request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Program source text
    pub source: String,
    /// Language identifier as supplied by the caller
    pub language: String,
    /// Data fed to the program's standard input
    #[serde(default)]
    pub stdin: String,
    #[serde(default)]
    pub limits: RequestedLimits,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            language: language.into(),
            stdin: String::new(),
            limits: RequestedLimits::default(),
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = stdin.into();
        self
    }

    pub fn with_limits(mut self, limits: RequestedLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Limits actually enforced for one execution, after clamping
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedLimits {
    pub timeout_ms: u64,
    pub memory_mb: u64,
    pub max_output_bytes: usize,
}

impl ResolvedLimits {
    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb * 1024 * 1024
    }
}

/// Outcome reported to the caller. Every failure kind uses this same shape.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    pub failed: bool,
}

impl ExecutionResult {
    /// Failure that never produced program output
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: message.into(),
            failed: true,
        }
    }
}

impl From<EngineError> for ExecutionResult {
    fn from(err: EngineError) -> Self {
        ExecutionResult::failure(err.to_string())
    }
}

/// Errors raised inside the engine before they are folded into an
/// [`ExecutionResult`]
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Invalid Java class name: {0}")]
    InvalidClassName(String),

    #[error("Server busy: {0} executions already running, please retry")]
    Busy(usize),

    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

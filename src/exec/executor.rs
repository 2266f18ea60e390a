/// Execution orchestration: validate, admit, prepare, compile, run, clean up
use crate::config::engine::EngineConfig;
use crate::config::types::{
    EngineError, ExecutionRequest, ExecutionResult, RequestedLimits, ResolvedLimits, Result,
};
use crate::exec::runner::{ProcessRunner, Termination};
use crate::judge::adapter::LanguageDriver;
use crate::judge::registry::DriverRegistry;
use crate::safety::admission::{AdmissionController, AdmissionSlot};
use crate::safety::workspace::{Workspace, WorkspaceManager};
use serde_json::Value;
use std::sync::Arc;

/// Public entry point of the engine. Cheap to share behind an `Arc`; every
/// call to [`CodeExecutor::execute`] runs as its own tokio task.
#[derive(Debug)]
pub struct CodeExecutor {
    config: EngineConfig,
    registry: DriverRegistry,
    workspaces: WorkspaceManager,
    admission: Arc<AdmissionController>,
    runner: ProcessRunner,
}

impl CodeExecutor {
    /// Executor with the built-in drivers for the configured toolchain
    pub fn new(config: EngineConfig) -> Result<Self> {
        let registry = DriverRegistry::with_toolchain(&config.toolchain);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: EngineConfig, registry: DriverRegistry) -> Result<Self> {
        let config = config.validated()?;
        let workspaces = WorkspaceManager::new(config.workspace_root.clone())?;
        let admission = AdmissionController::new(config.max_concurrency);
        let runner = ProcessRunner::new(&config);

        log::info!(
            "code executor ready: root={} max_concurrency={} languages={:?}",
            workspaces.base_dir().display(),
            config.max_concurrency,
            registry.languages()
        );

        Ok(Self {
            config,
            registry,
            workspaces,
            admission,
            runner,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Run one request. Every failure, including a panic inside the
    /// execution task, comes back as a failed [`ExecutionResult`].
    pub async fn execute(&self, request: ExecutionRequest) -> ExecutionResult {
        let driver = match self.validate(&request) {
            Ok(driver) => driver,
            Err(e) => {
                log::warn!("rejected {} request: {}", request.language, e);
                return e.into();
            }
        };

        let slot = match self.admission.try_admit() {
            Ok(slot) => slot,
            Err(e) => {
                log::warn!("rejected {} request: {}", request.language, e);
                return e.into();
            }
        };

        let limits = self.config.resolve_limits(&request.limits);
        let job = Job {
            driver,
            workspaces: self.workspaces.clone(),
            runner: self.runner.clone(),
            request,
            limits,
            _slot: slot,
        };

        match tokio::spawn(job.run()).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("execution task failed: {}", e);
                ExecutionResult::failure("Internal error: execution task failed")
            }
        }
    }

    /// Run an untyped JSON payload, type-checking each field first
    pub async fn execute_json(&self, payload: &Value) -> ExecutionResult {
        match parse_request(payload) {
            Ok(request) => self.execute(request).await,
            Err(e) => {
                log::warn!("rejected malformed request: {}", e);
                e.into()
            }
        }
    }

    /// Checks that need no resources. Nothing is allocated when this fails.
    fn validate(&self, request: &ExecutionRequest) -> Result<Arc<dyn LanguageDriver>> {
        if request.source.is_empty() {
            return Err(EngineError::Validation("Source code is required".to_string()));
        }
        if request.source.chars().count() > self.config.max_source_chars {
            return Err(EngineError::Validation(format!(
                "Source code exceeds maximum length of {} characters",
                self.config.max_source_chars
            )));
        }
        if request.stdin.chars().count() > self.config.max_stdin_chars {
            return Err(EngineError::Validation(format!(
                "Standard input exceeds maximum length of {} characters",
                self.config.max_stdin_chars
            )));
        }

        let driver = self.registry.resolve(&request.language)?;
        driver.validate_source(&request.source)?;
        Ok(driver)
    }
}

/// One admitted execution. Owns its admission slot, which is released when
/// the job is dropped, whether it finished or unwound.
struct Job {
    driver: Arc<dyn LanguageDriver>,
    workspaces: WorkspaceManager,
    runner: ProcessRunner,
    request: ExecutionRequest,
    limits: ResolvedLimits,
    _slot: AdmissionSlot,
}

impl Job {
    async fn run(self) -> ExecutionResult {
        let mut workspace = match self.workspaces.create_workspace() {
            Ok(workspace) => workspace,
            Err(e) => {
                log::error!("workspace setup failed: {}", e);
                return e.into();
            }
        };

        log::info!(
            "[{}] {} execution started (timeout {} ms, memory {} MB)",
            workspace.session_id(),
            self.driver.language(),
            self.limits.timeout_ms,
            self.limits.memory_mb
        );

        let result = self.run_in(&mut workspace).await;

        log::info!(
            "[{}] {} execution finished (failed={})",
            workspace.session_id(),
            self.driver.language(),
            result.failed
        );
        workspace.destroy();
        result
    }

    async fn run_in(&self, workspace: &mut Workspace) -> ExecutionResult {
        let program = match self.driver.prepare(&self.request.source, workspace, &self.limits) {
            Ok(program) => program,
            Err(e) => {
                log::warn!("[{}] prepare failed: {}", workspace.session_id(), e);
                return e.into();
            }
        };

        if let Some(compile) = &program.compile {
            let outcome = self.runner.run(compile, workspace.dir(), &self.limits, "").await;
            if outcome.result.failed {
                log::info!(
                    "[{}] compile step failed ({:?})",
                    workspace.session_id(),
                    outcome.termination
                );
                return outcome.result;
            }
            log::debug!(
                "[{}] compiled in {} ms",
                workspace.session_id(),
                outcome.elapsed.as_millis()
            );
        }

        let outcome = self
            .runner
            .run(&program.run, workspace.dir(), &self.limits, &self.request.stdin)
            .await;
        if matches!(outcome.termination, Termination::TimedOut | Termination::OutputLimit) {
            log::warn!(
                "[{}] run killed: {:?} after {} ms",
                workspace.session_id(),
                outcome.termination,
                outcome.elapsed.as_millis()
            );
        }
        outcome.result
    }
}

/// Build a typed request from an untyped payload with field-level messages
pub fn parse_request(payload: &Value) -> Result<ExecutionRequest> {
    let source = match payload.get("source") {
        None | Some(Value::Null) => {
            return Err(EngineError::Validation("Source code is required".to_string()))
        }
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(EngineError::Validation("Source code must be a string".to_string()))
        }
    };

    let language = match payload.get("language") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(EngineError::Validation("Language must be a string".to_string())),
    };

    let stdin = match payload.get("stdin") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(EngineError::Validation(
                "Standard input must be a string".to_string(),
            ))
        }
    };

    let limits = match payload.get("limits") {
        None | Some(Value::Null) => RequestedLimits::default(),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| EngineError::Validation(format!("Invalid limits: {}", e)))?,
    };

    Ok(ExecutionRequest {
        source,
        language,
        stdin,
        limits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::Language;
    use crate::exec::runner::CommandSpec;
    use crate::judge::adapter::PreparedProgram;
    use serde_json::json;

    fn test_config() -> EngineConfig {
        EngineConfig {
            workspace_root: std::env::temp_dir()
                .join(format!("codebox-executor-{}", uuid::Uuid::new_v4())),
            ..EngineConfig::default()
        }
    }

    fn cleanup(executor: &CodeExecutor) {
        let _ = std::fs::remove_dir_all(executor.workspaces().base_dir());
    }

    /// Driver whose prepare step panics, to prove cleanup on unwinding
    struct ExplodingDriver;

    impl LanguageDriver for ExplodingDriver {
        fn language(&self) -> Language {
            Language::Python
        }

        fn prepare(
            &self,
            source: &str,
            workspace: &mut Workspace,
            _limits: &ResolvedLimits,
        ) -> Result<PreparedProgram> {
            workspace.write_file("main.py", source.as_bytes())?;
            panic!("driver exploded");
        }
    }

    /// Driver that fails after writing its artifact
    struct FailingDriver;

    impl LanguageDriver for FailingDriver {
        fn language(&self) -> Language {
            Language::Python
        }

        fn prepare(
            &self,
            source: &str,
            workspace: &mut Workspace,
            _limits: &ResolvedLimits,
        ) -> Result<PreparedProgram> {
            workspace.write_file("main.py", source.as_bytes())?;
            Err(EngineError::Setup("disk full".to_string()))
        }
    }

    /// Driver that runs a binary that does not exist
    struct MissingToolDriver;

    impl LanguageDriver for MissingToolDriver {
        fn language(&self) -> Language {
            Language::Python
        }

        fn prepare(
            &self,
            _source: &str,
            _workspace: &mut Workspace,
            _limits: &ResolvedLimits,
        ) -> Result<PreparedProgram> {
            Ok(PreparedProgram {
                compile: None,
                run: CommandSpec::new("codebox-no-such-interpreter"),
            })
        }
    }

    fn executor_with(driver: impl LanguageDriver + 'static) -> CodeExecutor {
        let mut registry = DriverRegistry::empty();
        registry.register(driver);
        CodeExecutor::with_registry(test_config(), registry).unwrap()
    }

    #[tokio::test]
    async fn test_oversized_source_creates_no_workspace() {
        let executor = CodeExecutor::new(test_config()).unwrap();
        let source = "x".repeat(50_001);
        let result = executor.execute(ExecutionRequest::new(source, "python")).await;
        assert!(result.failed);
        assert_eq!(result.stderr, "Source code exceeds maximum length of 50000 characters");
        assert_eq!(executor.workspaces().live_count(), 0);
        assert_eq!(executor.admission().in_flight(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_length_is_counted_in_characters() {
        let mut config = test_config();
        config.max_source_chars = 4;
        let executor = CodeExecutor::with_registry(config, DriverRegistry::empty()).unwrap();
        // four characters, eight bytes
        let result = executor.execute(ExecutionRequest::new("éééé", "python")).await;
        assert_eq!(result.stderr, "Unsupported language: python");
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_oversized_stdin_rejected() {
        let executor = CodeExecutor::new(test_config()).unwrap();
        let request = ExecutionRequest::new("print(1)", "python").with_stdin("y".repeat(10_001));
        let result = executor.execute(request).await;
        assert!(result.failed);
        assert!(result.stderr.starts_with("Standard input exceeds maximum length"));
        assert_eq!(executor.workspaces().live_count(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_unknown_language_rejected() {
        let executor = CodeExecutor::new(test_config()).unwrap();
        let result = executor.execute(ExecutionRequest::new("x", "brainfuck")).await;
        assert_eq!(result, ExecutionResult::failure("Unsupported language: brainfuck"));
        assert_eq!(executor.workspaces().live_count(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_invalid_java_class_rejected_before_workspace() {
        let executor = CodeExecutor::new(test_config()).unwrap();
        let result = executor
            .execute(ExecutionRequest::new("public class ../../etc { }", "java"))
            .await;
        assert!(result.failed);
        assert!(result.stderr.starts_with("Invalid Java class name"));
        assert_eq!(executor.workspaces().live_count(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_busy_when_at_capacity() {
        let mut config = test_config();
        config.max_concurrency = 2;
        let executor = CodeExecutor::new(config).unwrap();

        let held: Vec<_> = (0..2).map(|_| executor.admission().try_admit().unwrap()).collect();
        let result = executor.execute(ExecutionRequest::new("print(1)", "python")).await;
        assert!(result.failed);
        assert!(result.stderr.starts_with("Server busy"));
        assert_eq!(executor.workspaces().live_count(), 0);

        drop(held);
        assert_eq!(executor.admission().in_flight(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_panicking_driver_still_cleans_up() {
        let executor = executor_with(ExplodingDriver);
        let result = executor.execute(ExecutionRequest::new("print(1)", "python")).await;
        assert!(result.failed);
        assert_eq!(result.stderr, "Internal error: execution task failed");
        assert_eq!(executor.workspaces().live_count(), 0);
        assert_eq!(executor.admission().in_flight(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_prepare_error_cleans_up() {
        let executor = executor_with(FailingDriver);
        let result = executor.execute(ExecutionRequest::new("print(1)", "python")).await;
        assert_eq!(result, ExecutionResult::failure("Setup error: disk full"));
        assert_eq!(executor.workspaces().live_count(), 0);
        assert_eq!(executor.admission().in_flight(), 0);
        cleanup(&executor);
    }

    #[tokio::test]
    async fn test_spawn_error_is_reported() {
        let executor = executor_with(MissingToolDriver);
        let result = executor.execute(ExecutionRequest::new("print(1)", "python")).await;
        assert!(result.failed);
        assert!(result.stderr.starts_with("Failed to start codebox-no-such-interpreter"));
        assert_eq!(executor.workspaces().live_count(), 0);
        assert_eq!(executor.admission().in_flight(), 0);
        cleanup(&executor);
    }

    #[test]
    fn test_parse_request_type_errors() {
        let cases = [
            (json!({"language": "python"}), "Source code is required"),
            (json!({"source": 42, "language": "python"}), "Source code must be a string"),
            (json!({"source": "x"}), "Language must be a string"),
            (json!({"source": "x", "language": ["python"]}), "Language must be a string"),
            (json!({"source": "x", "language": "python", "stdin": 5}), "Standard input must be a string"),
        ];
        for (payload, expected) in cases {
            let err = parse_request(&payload).unwrap_err();
            assert_eq!(err.to_string(), expected, "payload {}", payload);
        }
    }

    #[test]
    fn test_parse_request_full() {
        let payload = json!({
            "source": "print(input())",
            "language": "Python",
            "stdin": "hello",
            "limits": {"timeoutMs": 2000, "memoryMb": 64},
            "token": "ignored-bearer-token"
        });
        let request = parse_request(&payload).unwrap();
        assert_eq!(request.language, "Python");
        assert_eq!(request.stdin, "hello");
        assert_eq!(request.limits.timeout_ms, Some(2000));
        assert_eq!(request.limits.memory_mb, Some(64));
    }

    #[test]
    fn test_parse_request_bad_limits() {
        let payload = json!({"source": "x", "language": "js", "limits": {"timeoutMs": "soon"}});
        assert!(parse_request(&payload).unwrap_err().to_string().starts_with("Invalid limits"));
    }

    #[tokio::test]
    async fn test_execute_json_validation_creates_nothing() {
        let executor = CodeExecutor::new(test_config()).unwrap();
        let result = executor.execute_json(&json!({"source": 1, "language": "python"})).await;
        assert_eq!(result, ExecutionResult::failure("Source code must be a string"));
        assert_eq!(executor.workspaces().live_count(), 0);
        cleanup(&executor);
    }
}

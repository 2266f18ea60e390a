//! codebox: sandboxed execution of untrusted Python, JavaScript, Java and C++
//!
//! A caller hands over `(source, language, stdin, limits)` and gets back
//! `(stdout, stderr, failed)`. Every run happens in a fresh workspace, as its
//! own process group, under a wall-clock deadline, a memory budget and a
//! per-stream output ceiling.
//!
//! # Architecture
//!
//! - [`judge`]: per-language drivers (write sources, describe compile/run commands)
//! - [`exec::runner`]: spawns one program, streams bounded output, enforces deadlines
//! - [`exec::watchdog`]: independent timer thread that kills a stuck process tree
//! - [`exec::executor`]: the public orchestrator
//! - [`safety`]: per-execution workspaces and the admission budget
//! - [`kernel`]: process-group kill and child rlimits
//! - [`config`]: request/result types, engine settings, validation
//! - [`utils`]: environment hygiene and bounded output buffers

pub mod config;
pub mod exec;
pub mod judge;
pub mod kernel;
pub mod safety;
pub mod utils;

// CLI entrypoint wiring for the codebox binary
pub mod cli;

pub use config::engine::EngineConfig;
pub use config::types::{
    EngineError, ExecutionRequest, ExecutionResult, Language, RequestedLimits, ResolvedLimits,
    Result,
};
pub use exec::executor::CodeExecutor;

use once_cell::sync::OnceCell;

static GLOBAL_EXECUTOR: OnceCell<CodeExecutor> = OnceCell::new();

/// Process-wide executor, configured from `CODEBOX_CONFIG` or defaults on
/// first use. Its admission counter is shared by every caller in the process.
pub fn global_executor() -> Result<&'static CodeExecutor> {
    GLOBAL_EXECUTOR.get_or_try_init(|| CodeExecutor::new(EngineConfig::load(None)?))
}

/// Execute a request on the process-wide executor
pub async fn execute(request: ExecutionRequest) -> ExecutionResult {
    match global_executor() {
        Ok(executor) => executor.execute(request).await,
        Err(e) => {
            log::error!("code executor unavailable: {}", e);
            e.into()
        }
    }
}

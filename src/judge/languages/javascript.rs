use crate::config::types::{Language, ResolvedLimits, Result};
use crate::exec::runner::CommandSpec;
use crate::judge::adapter::{path_arg, LanguageDriver, PreparedProgram};
use crate::safety::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct JavaScriptDriver {
    runtime: String,
}

impl JavaScriptDriver {
    pub fn new(runtime: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
        }
    }
}

impl LanguageDriver for JavaScriptDriver {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn prepare(
        &self,
        source: &str,
        workspace: &mut Workspace,
        limits: &ResolvedLimits,
    ) -> Result<PreparedProgram> {
        let script = workspace.write_file("main.js", source.as_bytes())?;

        // V8 reserves far more virtual memory than it uses, so the heap flag
        // stands in for an address-space rlimit
        let run = CommandSpec::new(&self.runtime)
            .arg(format!("--max-old-space-size={}", limits.memory_mb))
            .arg(path_arg(&script))
            .env("NODE_OPTIONS", "")
            .env("NODE_DISABLE_COLORS", "1");

        Ok(PreparedProgram { compile: None, run })
    }
}

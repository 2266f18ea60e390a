use crate::config::types::{Language, ResolvedLimits, Result};
use crate::exec::runner::CommandSpec;
use crate::judge::adapter::{path_arg, LanguageDriver, PreparedProgram};
use crate::safety::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct PythonDriver {
    interpreter: String,
}

impl PythonDriver {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl LanguageDriver for PythonDriver {
    fn language(&self) -> Language {
        Language::Python
    }

    fn prepare(
        &self,
        source: &str,
        workspace: &mut Workspace,
        limits: &ResolvedLimits,
    ) -> Result<PreparedProgram> {
        let script = workspace.write_file("main.py", source.as_bytes())?;

        // -B: no .pyc writes, -s: no user site-packages
        let run = CommandSpec::new(&self.interpreter)
            .arg("-B")
            .arg("-s")
            .arg(path_arg(&script))
            .env("PYTHONNOUSERSITE", "1")
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .env("PYTHONIOENCODING", "utf-8")
            .address_space_limit(limits.memory_bytes());

        Ok(PreparedProgram { compile: None, run })
    }
}

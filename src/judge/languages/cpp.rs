use crate::config::types::{Language, ResolvedLimits, Result};
use crate::exec::runner::CommandSpec;
use crate::judge::adapter::{path_arg, LanguageDriver, PreparedProgram};
use crate::safety::workspace::Workspace;

const EXECUTABLE_NAME: &str = if cfg!(windows) { "main.exe" } else { "main" };

#[derive(Debug, Clone)]
pub struct CppDriver {
    compiler: String,
}

impl CppDriver {
    pub fn new(compiler: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
        }
    }
}

impl LanguageDriver for CppDriver {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn prepare(
        &self,
        source: &str,
        workspace: &mut Workspace,
        limits: &ResolvedLimits,
    ) -> Result<PreparedProgram> {
        let source_file = workspace.write_file("main.cpp", source.as_bytes())?;
        let executable = workspace.artifact_path(EXECUTABLE_NAME)?;

        // The compiler itself runs without an address-space cap; cc1plus
        // routinely needs more than a program's budget
        let compile = CommandSpec::new(&self.compiler)
            .arg("-std=c++17")
            .arg("-O2")
            .arg("-pipe")
            .arg("-o")
            .arg(path_arg(&executable))
            .arg(path_arg(&source_file));

        let run = CommandSpec::new(path_arg(&executable)).address_space_limit(limits.memory_bytes());

        Ok(PreparedProgram {
            compile: Some(compile),
            run,
        })
    }
}

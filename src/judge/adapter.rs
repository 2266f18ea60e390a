use crate::config::types::{Language, ResolvedLimits, Result};
use crate::exec::runner::CommandSpec;
use crate::safety::workspace::Workspace;

/// What a driver produced for one execution: an optional compile step and the
/// program to run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreparedProgram {
    pub compile: Option<CommandSpec>,
    pub run: CommandSpec,
}

/// Language driver contract. Drivers write their source artifacts into the
/// workspace and describe the commands; they never spawn anything themselves.
pub trait LanguageDriver: Send + Sync {
    fn language(&self) -> Language;

    /// Checks that can be decided from the source text alone. Runs before
    /// any workspace exists.
    fn validate_source(&self, _source: &str) -> Result<()> {
        Ok(())
    }

    fn prepare(
        &self,
        source: &str,
        workspace: &mut Workspace,
        limits: &ResolvedLimits,
    ) -> Result<PreparedProgram>;
}

/// Path argument for a workspace file
pub(crate) fn path_arg(path: &std::path::Path) -> String {
    path.to_string_lossy().into_owned()
}

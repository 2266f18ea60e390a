use crate::config::types::{EngineError, Language, ResolvedLimits, Result};
use crate::exec::runner::CommandSpec;
use crate::judge::adapter::{path_arg, LanguageDriver, PreparedProgram};
use crate::safety::workspace::Workspace;
use once_cell::sync::Lazy;
use regex::Regex;

const DEFAULT_CLASS_NAME: &str = "Main";

/// `public [final|abstract|strictfp] class <token>`. The token is captured
/// loosely on purpose so hostile names reach validation instead of silently
/// falling back to the default.
static PUBLIC_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bpublic\s+(?:(?:final|abstract|strictfp)\s+)*class\s+([^\s{<]+)")
        .expect("public class pattern compiles")
});

static CLASS_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,63}$").expect("class name pattern compiles"));

/// Class name the program will be compiled and launched under
pub fn detect_class_name(source: &str) -> &str {
    PUBLIC_CLASS
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(DEFAULT_CLASS_NAME)
}

/// Detect and validate in one step; the returned name is safe to use in a
/// file path and as a launcher argument
pub fn resolve_class_name(source: &str) -> Result<String> {
    let name = detect_class_name(source);
    if !CLASS_NAME.is_match(name) {
        return Err(EngineError::InvalidClassName(name.chars().take(80).collect()));
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone)]
pub struct JavaDriver {
    compiler: String,
    runtime: String,
}

impl JavaDriver {
    pub fn new(compiler: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            compiler: compiler.into(),
            runtime: runtime.into(),
        }
    }
}

impl LanguageDriver for JavaDriver {
    fn language(&self) -> Language {
        Language::Java
    }

    fn validate_source(&self, source: &str) -> Result<()> {
        resolve_class_name(source).map(|_| ())
    }

    fn prepare(
        &self,
        source: &str,
        workspace: &mut Workspace,
        limits: &ResolvedLimits,
    ) -> Result<PreparedProgram> {
        let class_name = resolve_class_name(source)?;
        let source_file = workspace.write_file(&format!("{}.java", class_name), source.as_bytes())?;
        workspace.artifact_path(&format!("{}.class", class_name))?;

        let classpath = path_arg(workspace.dir());

        let compile = CommandSpec::new(&self.compiler)
            .arg("-encoding")
            .arg("UTF-8")
            .arg("-d")
            .arg(&classpath)
            .arg(path_arg(&source_file));

        // JVM heap is capped by -Xmx; an RLIMIT_AS would stop the JVM from
        // reserving its address space at all
        let run = CommandSpec::new(&self.runtime)
            .arg(format!("-Xmx{}m", limits.memory_mb))
            .arg("-Xss8m")
            .arg("-XX:+UseSerialGC")
            .arg(format!("-Djava.io.tmpdir={}", classpath))
            .arg("-cp")
            .arg(&classpath)
            .arg(class_name);

        Ok(PreparedProgram {
            compile: Some(compile),
            run,
        })
    }
}

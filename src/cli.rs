use crate::config::engine::{EngineConfig, Toolchain};
use crate::config::types::{ExecutionRequest, ExecutionResult, RequestedLimits};
use crate::exec::executor::CodeExecutor;
use crate::safety::workspace::WorkspaceManager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON engine config (defaults to $CODEBOX_CONFIG, then built-in limits)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute source code and print the JSON result
    ExecuteCode {
        /// Programming language (python, javascript/js, java, cpp/c++)
        #[arg(long)]
        language: String,
        /// Source code as string
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        code: Option<String>,
        /// Read source code from a file
        #[arg(long)]
        file: Option<PathBuf>,
        /// Input data to pass to stdin
        #[arg(long)]
        stdin: Option<String>,
        /// Wall clock limit in milliseconds (clamped to the configured range)
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Memory limit in MB (clamped to the configured range)
        #[arg(long)]
        memory_mb: Option<u64>,
    },
    /// Execute a raw JSON request `{source, language, stdin, limits}`
    ExecuteJson {
        /// Request file; stdin when omitted
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Check that the configured language toolchains are installed
    CheckDeps {
        /// Show version information for each tool
        #[arg(long)]
        verbose: bool,
    },
    /// Remove workspaces left behind by a crashed process
    Cleanup {
        /// Only remove workspaces older than this many seconds
        #[arg(long, default_value_t = 3600)]
        max_age_secs: u64,
    },
}

pub fn run() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::ExecuteCode {
            language,
            code,
            file,
            stdin,
            timeout_ms,
            memory_mb,
        } => {
            let source = match (code, file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => anyhow::bail!("either --code or --file is required"),
            };
            let request = ExecutionRequest::new(source, language)
                .with_stdin(stdin.unwrap_or_default())
                .with_limits(RequestedLimits {
                    timeout_ms,
                    memory_mb,
                });

            let executor = CodeExecutor::new(config)?;
            let result = block_on(executor.execute(request))?;
            finish(&result)
        }
        Commands::ExecuteJson { request } => {
            let raw = match request {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read request from stdin")?;
                    buf
                }
            };
            let payload: serde_json::Value =
                serde_json::from_str(&raw).context("request is not valid JSON")?;

            let executor = CodeExecutor::new(config)?;
            let result = block_on(executor.execute_json(&payload))?;
            finish(&result)
        }
        Commands::CheckDeps { verbose } => check_language_dependencies(&config.toolchain, verbose),
        Commands::Cleanup { max_age_secs } => {
            let manager = WorkspaceManager::new(config.workspace_root.clone())?;
            let cleaned = manager.cleanup_stale(Duration::from_secs(max_age_secs))?;
            println!(
                "Removed {} stale workspace(s) from {}",
                cleaned,
                manager.base_dir().display()
            );
            Ok(())
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

fn finish(result: &ExecutionResult) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(result)?);
    if result.failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Outcome of probing one toolchain binary
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub language: &'static str,
    pub binary: String,
    /// First line of the version banner, `None` when the tool is unusable
    pub version: Option<String>,
}

pub fn probe_toolchain(toolchain: &Toolchain) -> Vec<ToolStatus> {
    use std::process::Command;

    let tools = [
        ("Python", &toolchain.python, "--version"),
        ("JavaScript", &toolchain.node, "--version"),
        ("Java", &toolchain.javac, "-version"),
        ("Java", &toolchain.java, "-version"),
        ("C++", &toolchain.cxx, "--version"),
    ];

    tools
        .into_iter()
        .map(|(language, binary, version_arg)| {
            let version = Command::new(binary)
                .arg(version_arg)
                .output()
                .ok()
                .filter(|output| output.status.success())
                .map(|output| {
                    // java/javac print their banner on stderr
                    let text = if output.stdout.is_empty() {
                        output.stderr
                    } else {
                        output.stdout
                    };
                    String::from_utf8_lossy(&text)
                        .lines()
                        .next()
                        .unwrap_or("")
                        .trim()
                        .to_string()
                });
            ToolStatus {
                language,
                binary: binary.clone(),
                version,
            }
        })
        .collect()
}

fn check_language_dependencies(toolchain: &Toolchain, verbose: bool) -> Result<()> {
    println!("Checking language toolchains...");

    let statuses = probe_toolchain(toolchain);
    for status in &statuses {
        match &status.version {
            Some(version) if verbose => {
                println!("OK      {:<10} {} ({})", status.language, status.binary, version)
            }
            Some(_) => println!("OK      {:<10} {}", status.language, status.binary),
            None => println!("MISSING {:<10} {}", status.language, status.binary),
        }
    }

    let missing = statuses.iter().filter(|s| s.version.is_none()).count();
    if missing > 0 {
        anyhow::bail!("{} toolchain binaries are missing or unusable", missing);
    }
    println!("All language toolchains are installed");
    Ok(())
}

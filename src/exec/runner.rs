/// Child process runner
///
/// Spawns one program with an explicit argument vector (never through a
/// shell), feeds stdin, drains stdout/stderr into bounded buffers, and races
/// process exit against the wall-clock deadline and the output ceiling. Any
/// limit violation ends with the whole process group being killed.
use crate::config::engine::EngineConfig;
use crate::config::types::{ExecutionResult, ResolvedLimits};
use crate::exec::watchdog::Watchdog;
use crate::kernel::rlimit::ChildRlimits;
use crate::kernel::signal::kill_process_tree;
use crate::utils::env_hygiene::child_environment;
use crate::utils::output::{bounded_utf8, collect_stream, OutputBuffer};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// How long readers may keep draining after the tree has been killed
const DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// One program invocation prepared by a language driver
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name (resolved on the child's `PATH`) or absolute path
    pub program: String,
    pub args: Vec<String>,
    /// Driver-specific environment, layered over the base child environment
    pub env: Vec<(String, String)>,
    /// RLIMIT_AS for this invocation, if the runtime tolerates one
    pub address_space_limit: Option<u64>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            address_space_limit: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn address_space_limit(mut self, bytes: u64) -> Self {
        self.address_space_limit = Some(bytes);
        self
    }
}

/// Why the run ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Process exited on its own; `None` when killed by a signal we did not send
    Exited(Option<i32>),
    TimedOut,
    OutputLimit,
    SpawnFailed,
    WaitFailed,
}

#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub result: ExecutionResult,
    pub termination: Termination,
    pub elapsed: Duration,
}

impl RunOutcome {
    fn spawn_failure(message: String) -> Self {
        Self {
            result: ExecutionResult::failure(message),
            termination: Termination::SpawnFailed,
            elapsed: Duration::ZERO,
        }
    }
}

enum Race {
    Exited(std::io::Result<ExitStatus>),
    Deadline,
    Overflow,
}

/// Runs programs under the engine's watchdog and output policy
#[derive(Clone, Debug)]
pub struct ProcessRunner {
    watchdog_grace: Duration,
    debug_prefix_bytes: usize,
    max_file_size_bytes: u64,
}

impl ProcessRunner {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            watchdog_grace: Duration::from_millis(config.watchdog_grace_ms),
            debug_prefix_bytes: config.debug_prefix_bytes,
            max_file_size_bytes: config.max_file_size_bytes,
        }
    }

    /// Run `spec` in `working_dir` and report a bounded result. Never errors:
    /// spawn and wait failures are folded into a failed result.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        working_dir: &Path,
        limits: &ResolvedLimits,
        stdin: &str,
    ) -> RunOutcome {
        let timeout = Duration::from_millis(limits.timeout_ms);
        let max_output = limits.max_output_bytes;

        let mut cmd = self.build_command(spec, working_dir, !stdin.is_empty());

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                log::warn!("failed to start {}: {}", spec.program, e);
                return RunOutcome::spawn_failure(bounded_utf8(
                    format!("Failed to start {}: {}", spec.program, e).as_bytes(),
                    max_output,
                ));
            }
        };
        let Some(pid) = child.id() else {
            return RunOutcome::spawn_failure(format!(
                "Failed to start {}: process exited before it could be tracked",
                spec.program
            ));
        };
        log::debug!("spawned {} as pid {}", spec.program, pid);

        let watchdog = Watchdog::arm(pid, timeout + self.watchdog_grace);

        let overflow = Arc::new(Notify::new());
        let stdout_buf = OutputBuffer::new(max_output);
        let stderr_buf = OutputBuffer::new(max_output);
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(collect_stream(pipe, Arc::clone(&stdout_buf), Arc::clone(&overflow))));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(collect_stream(pipe, Arc::clone(&stderr_buf), Arc::clone(&overflow))));

        let stdin_task = child.stdin.take().map(|mut pipe| {
            let payload = stdin_payload(stdin);
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(payload.as_bytes()).await {
                    log::debug!("stdin write stopped: {}", e);
                }
                // dropping the pipe delivers EOF
            })
        });

        let race = tokio::select! {
            status = child.wait() => Race::Exited(status),
            _ = tokio::time::sleep(timeout) => Race::Deadline,
            _ = overflow.notified() => Race::Overflow,
        };

        let watchdog_fired = watchdog.disarm();

        // Also reaps background descendants after a normal exit
        if let Err(e) = kill_process_tree(pid) {
            log::warn!("failed to kill process group {}: {}", pid, e);
            let _ = child.start_kill();
        }
        if !matches!(race, Race::Exited(_)) {
            if let Err(e) = child.wait().await {
                log::warn!("failed to reap pid {}: {}", pid, e);
            }
        }
        let elapsed = started.elapsed();

        drain(stdout_task).await;
        drain(stderr_task).await;
        if let Some(task) = stdin_task {
            task.abort();
        }

        let overflowed = stdout_buf.overflowed() || stderr_buf.overflowed();
        let termination = match race {
            _ if watchdog_fired => Termination::TimedOut,
            Race::Deadline => Termination::TimedOut,
            Race::Overflow => Termination::OutputLimit,
            Race::Exited(_) if overflowed => Termination::OutputLimit,
            Race::Exited(Ok(status)) => Termination::Exited(status.code()),
            Race::Exited(Err(e)) => {
                log::warn!("waiting on pid {} failed: {}", pid, e);
                Termination::WaitFailed
            }
        };

        let result = match &termination {
            Termination::TimedOut => {
                log::warn!("pid {} exceeded {} ms, killed", pid, limits.timeout_ms);
                self.limit_result(&stdout_buf, &timeout_message(limits.timeout_ms), max_output)
            }
            Termination::OutputLimit => {
                log::warn!("pid {} exceeded {} output bytes, killed", pid, max_output);
                self.limit_result(&stdout_buf, &output_limit_message(max_output), max_output)
            }
            Termination::Exited(code) => ExecutionResult {
                stdout: stdout_buf.to_text(max_output),
                stderr: stderr_buf.to_text(max_output),
                failed: *code != Some(0),
            },
            Termination::WaitFailed | Termination::SpawnFailed => ExecutionResult {
                stdout: stdout_buf.to_text(max_output),
                stderr: bounded_utf8(
                    format!("Failed to wait for {}", spec.program).as_bytes(),
                    max_output,
                ),
                failed: true,
            },
        };

        RunOutcome {
            result,
            termination,
            elapsed,
        }
    }

    fn build_command(&self, spec: &CommandSpec, working_dir: &Path, pipe_stdin: bool) -> Command {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(working_dir)
            .env_clear()
            .envs(child_environment(working_dir, &spec.env))
            .stdin(if pipe_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            let rlimits = ChildRlimits {
                address_space: spec.address_space_limit,
                file_size: Some(self.max_file_size_bytes),
            };
            // SAFETY: the hook runs between fork and exec and only issues
            // setpgid/setrlimit, both async-signal-safe.
            unsafe {
                cmd.pre_exec(move || {
                    use nix::unistd::{setpgid, Pid};
                    setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
                    rlimits.apply()
                });
            }
        }

        #[cfg(windows)]
        {
            const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
            cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
        }

        cmd
    }

    /// Result for a run killed by a limit: fixed diagnostic on stderr and a
    /// short stdout prefix for debugging
    fn limit_result(&self, stdout: &OutputBuffer, message: &str, max_output: usize) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_text(self.debug_prefix_bytes.min(max_output)),
            stderr: bounded_utf8(message.as_bytes(), max_output),
            failed: true,
        }
    }
}

async fn drain(task: Option<JoinHandle<()>>) {
    let Some(mut task) = task else {
        return;
    };
    // A descendant that escaped the process group can hold the pipe open
    if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
        log::warn!("output reader did not finish after kill, abandoning");
        task.abort();
    }
}

/// Terminate non-empty input with a newline so line readers see a full line
fn stdin_payload(stdin: &str) -> String {
    let mut payload = stdin.to_string();
    if !payload.is_empty() && !payload.ends_with('\n') {
        payload.push('\n');
    }
    payload
}

pub fn timeout_message(timeout_ms: u64) -> String {
    if timeout_ms % 1000 == 0 {
        let secs = timeout_ms / 1000;
        let unit = if secs == 1 { "second" } else { "seconds" };
        format!("Execution timeout ({} {} exceeded)", secs, unit)
    } else {
        format!("Execution timeout ({} ms exceeded)", timeout_ms)
    }
}

pub fn output_limit_message(max_output_bytes: usize) -> String {
    format!("Output limit exceeded ({} bytes per stream)", max_output_bytes)
}

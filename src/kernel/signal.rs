/// Process-tree termination
///
/// Every child is started as the leader of its own process group (Unix) or
/// process group / job tree (Windows). Killing a child always means killing
/// that whole tree so forked helpers cannot outlive the execution.
use crate::config::types::Result;

/// Force-kill the process tree rooted at `pid`. A tree that is already gone
/// is not an error.
#[cfg(unix)]
pub fn kill_process_tree(pid: u32) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return Ok(());
    };
    // pid 0/1 would address our own group or init
    if raw <= 1 {
        return Ok(());
    }

    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => {
            log::debug!("sent SIGKILL to process group {}", raw);
            Ok(())
        }
        Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(std::io::Error::from(e).into()),
    }
}

#[cfg(windows)]
pub fn kill_process_tree(pid: u32) -> Result<()> {
    use std::process::{Command, Stdio};

    let status = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    // taskkill exits 128 when the process no longer exists
    if !status.success() {
        log::debug!("taskkill for {} exited with {}", pid, status);
    }
    Ok(())
}

/// Whether any live (non-zombie) process remains in the group led by `pgid`
#[cfg(target_os = "linux")]
pub fn process_group_alive(pgid: u32) -> bool {
    if pgid <= 1 {
        return false;
    }
    let Ok(entries) = std::fs::read_dir("/proc") else {
        return false;
    };
    entries.filter_map(|entry| entry.ok()).any(|entry| {
        let is_pid = entry
            .file_name()
            .to_str()
            .map_or(false, |name| name.bytes().all(|b| b.is_ascii_digit()));
        is_pid
            && std::fs::read_to_string(entry.path().join("stat"))
                .ok()
                .and_then(|stat| parse_stat(&stat))
                .map_or(false, |(state, pgrp)| pgrp == pgid && state != 'Z')
    })
}

/// `(state, pgrp)` from a /proc/<pid>/stat line. The command name may contain
/// spaces and parentheses, so parsing starts after the last ')'.
#[cfg(target_os = "linux")]
fn parse_stat(stat: &str) -> Option<(char, u32)> {
    let rest = stat.get(stat.rfind(')')? + 1..)?;
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    let _ppid = fields.next()?;
    let pgrp = fields.next()?.parse().ok()?;
    Some((state, pgrp))
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn process_group_alive(pgid: u32) -> bool {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    match i32::try_from(pgid) {
        Ok(raw) if raw > 1 => killpg(Pid::from_raw(raw), None).is_ok(),
        _ => false,
    }
}

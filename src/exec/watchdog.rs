/// Secondary wall-clock guard
///
/// The runner's own deadline lives on the async runtime. The watchdog is a
/// plain OS thread with its own timer, so a stalled runtime or a missed wakeup
/// still ends in the process tree being killed.
use crate::kernel::signal::kill_process_tree;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub struct Watchdog {
    disarm_tx: Option<Sender<()>>,
    fired: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Arm a watchdog that kills the tree rooted at `pid` after `after`
    /// unless disarmed first
    pub fn arm(pid: u32, after: Duration) -> Self {
        let (disarm_tx, disarm_rx) = bounded::<()>(1);
        let fired = Arc::new(AtomicBool::new(false));
        let fired_flag = Arc::clone(&fired);

        let handle = thread::Builder::new()
            .name(format!("codebox-watchdog-{}", pid))
            .spawn(move || {
                // Disarmed explicitly or by the sender being dropped
                if let Err(RecvTimeoutError::Timeout) = disarm_rx.recv_timeout(after) {
                    fired_flag.store(true, Ordering::SeqCst);
                    log::warn!("watchdog fired for pid {} after {:?}", pid, after);
                    if let Err(e) = kill_process_tree(pid) {
                        log::error!("watchdog failed to kill pid {}: {}", pid, e);
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("failed to start watchdog thread for pid {}: {}", pid, e);
                None
            }
        };

        Self {
            disarm_tx: Some(disarm_tx),
            fired,
            handle,
        }
    }

    pub fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Stop the timer and wait for the thread. Returns whether it fired.
    pub fn disarm(mut self) -> bool {
        self.stop();
        self.fired()
    }

    fn stop(&mut self) {
        if let Some(tx) = self.disarm_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_disarm_before_deadline() {
        let start = Instant::now();
        // Nonexistent pid; nothing may be killed either way
        let watchdog = Watchdog::arm(2_000_000_000, Duration::from_secs(30));
        assert!(!watchdog.disarm());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_fires_after_deadline() {
        let watchdog = Watchdog::arm(2_000_000_000, Duration::from_millis(20));
        thread::sleep(Duration::from_millis(200));
        assert!(watchdog.fired());
        assert!(watchdog.disarm());
    }

    #[cfg(unix)]
    #[test]
    fn test_kills_runaway_process() {
        use std::os::unix::process::CommandExt;

        let mut child = match std::process::Command::new("sleep")
            .arg("30")
            .process_group(0)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                eprintln!("skipping: sleep unavailable ({})", e);
                return;
            }
        };
        let watchdog = Watchdog::arm(child.id(), Duration::from_millis(50));
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert!(watchdog.disarm());
    }
}

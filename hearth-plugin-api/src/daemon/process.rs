//! Process liveness and termination

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::DaemonError;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, kill};
#[cfg(unix)]
use nix::sys::wait::{WaitPidFlag, waitpid};
#[cfg(unix)]
use nix::unistd::Pid;

#[cfg(unix)]
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .map(Pid::from_raw)
}

/// Check whether a process with this id exists
///
/// Sends signal 0, which only probes. A process owned by another user still
/// counts as alive.
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

/// Collect the exit status if `pid` is an exited child of this process
///
/// An exited child stays a zombie, and zombies still answer the liveness probe.
/// For anything that is not our child this is a no-op.
#[cfg(unix)]
fn reap(pid: u32) {
    if let Some(pid) = to_pid(pid) {
        let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
    }
}

#[cfg(not(unix))]
fn reap(_pid: u32) {}

/// Deadline `timeout` from now, or `None` when that is past what `Instant` can hold
pub(crate) fn deadline(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Sleep for one poll interval, cut short at `deadline`. Returns false once the
/// deadline has passed.
pub(crate) fn poll_until(deadline: Option<Instant>, poll_interval: Duration) -> bool {
    match deadline {
        Some(deadline) => {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(poll_interval.min(deadline - now));
        }
        None => thread::sleep(poll_interval),
    }
    true
}

/// Poll until `pid` is gone or `timeout` passes. Returns true if it is gone.
pub fn wait_for_exit(pid: u32, timeout: Duration, poll_interval: Duration) -> bool {
    let deadline = deadline(timeout);

    loop {
        reap(pid);
        if !is_alive(pid) {
            return true;
        }
        if !poll_until(deadline, poll_interval) {
            return false;
        }
    }
}

/// How far `terminate` goes when the process outlives SIGTERM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Escalation {
    /// Give up after SIGTERM
    #[default]
    None,
    /// Follow up with SIGKILL and wait once more
    Kill,
}

#[cfg(unix)]
fn send(target: Pid, pid: u32, signal: Signal) -> Result<bool, DaemonError> {
    match kill(target, signal) {
        Ok(()) => {
            info!(pid, %signal, "sent signal");
            Ok(true)
        }
        // Already gone between the status check and now
        Err(Errno::ESRCH) => {
            debug!(pid, "process exited before it was signalled");
            Ok(false)
        }
        Err(e) => Err(DaemonError::signal_failure_with_source(
            pid,
            format!("failed to send {}", signal),
            e,
        )),
    }
}

/// Send SIGTERM to `pid` and wait up to `timeout` for it to exit
///
/// With `Escalation::Kill` a survivor gets SIGKILL and another `timeout`.
#[cfg(unix)]
pub fn terminate(
    pid: u32,
    timeout: Duration,
    poll_interval: Duration,
    escalation: Escalation,
) -> Result<(), DaemonError> {
    let target = to_pid(pid)
        .ok_or_else(|| DaemonError::signal_failure(pid, "invalid process id"))?;

    if !send(target, pid, Signal::SIGTERM)? || wait_for_exit(pid, timeout, poll_interval) {
        return Ok(());
    }

    if escalation == Escalation::Kill {
        warn!(pid, "process ignored SIGTERM, sending SIGKILL");
        if !send(target, pid, Signal::SIGKILL)? || wait_for_exit(pid, timeout, poll_interval) {
            return Ok(());
        }
        return Err(DaemonError::signal_failure(
            pid,
            format!("process still running {}ms after SIGKILL", timeout.as_millis()),
        ));
    }

    Err(DaemonError::signal_failure(
        pid,
        format!(
            "process still running {}ms after SIGTERM",
            timeout.as_millis()
        ),
    ))
}

#[cfg(not(unix))]
pub fn terminate(
    pid: u32,
    _timeout: Duration,
    _poll_interval: Duration,
    _escalation: Escalation,
) -> Result<(), DaemonError> {
    Err(DaemonError::signal_failure(
        pid,
        "stopping a daemon is not supported on this platform",
    ))
}

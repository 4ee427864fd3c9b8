//! Daemon handle: start, query and stop one daemon through its pidfile

use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;

use tracing::{debug, warn};

use super::spawn::{DaemonSpawnConfig, spawn_detached};
use super::process::Escalation;
use super::{DaemonError, pidfile, process};

/// Everything needed to run a program as a daemon
#[derive(Debug, Clone)]
pub struct DaemonSetup {
    /// Executable to re-run in the background
    pub program: PathBuf,
    /// Arguments for the background process
    pub args: Vec<String>,
    /// Where the daemon's PID is recorded
    pub pidfile: PathBuf,
    /// How long a fresh daemon must stay alive to count as started
    pub startup_wait: Duration,
    /// How long to wait for a signalled daemon to exit
    pub stop_timeout: Duration,
    /// Interval between liveness checks while waiting
    pub poll_interval: Duration,
    /// Whether a daemon that outlives SIGTERM gets SIGKILL
    pub escalation: Escalation,
}

impl DaemonSetup {
    pub fn new(program: impl Into<PathBuf>, pidfile: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            pidfile: pidfile.into(),
            startup_wait: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_millis(50),
            escalation: Escalation::None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_startup_wait(mut self, wait: Duration) -> Self {
        self.startup_wait = wait;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_escalation(mut self, escalation: Escalation) -> Self {
        self.escalation = escalation;
        self
    }
}

/// Handle on a daemon identified by its pidfile
///
/// Lives for a single invocation; nothing about it is persisted except the
/// pidfile itself.
#[derive(Debug)]
pub struct Daemon {
    setup: DaemonSetup,
}

impl Daemon {
    pub fn setup(setup: DaemonSetup) -> Self {
        Self { setup }
    }

    pub fn pidfile(&self) -> &Path {
        &self.setup.pidfile
    }

    /// PID of the running daemon, or 0 if none is running
    pub fn status(&self) -> u32 {
        pidfile::resolve_pid_status(&self.setup.pidfile)
    }

    /// Start the program in the background and record its PID
    ///
    /// Fails with `AlreadyRunning` when the pidfile names a live process. The
    /// status check and the spawn are not atomic: two starts racing on the same
    /// pidfile can both get through.
    pub fn start(&self) -> Result<u32, DaemonError> {
        let running = self.status();
        if running != 0 {
            return Err(DaemonError::AlreadyRunning { pid: running });
        }

        let spawn_config =
            DaemonSpawnConfig::new(&self.setup.program).with_args(self.setup.args.clone());
        let mut child = spawn_detached(&spawn_config).map_err(|e| {
            DaemonError::detach_failure_with_source(
                format!("failed to spawn '{}'", self.setup.program.display()),
                e,
            )
        })?;
        let pid = child.id();

        if let Err(e) = pidfile::write_pid(&self.setup.pidfile, pid) {
            // An unrecorded daemon could never be stopped through the pidfile
            let _ = child.kill();
            let _ = child.wait();
            return Err(DaemonError::detach_failure_with_source(
                format!(
                    "failed to write PID file '{}'",
                    self.setup.pidfile.display()
                ),
                e,
            ));
        }

        if let Err(e) = self.wait_for_startup(&mut child) {
            if let Err(remove_err) = pidfile::remove_pid(&self.setup.pidfile) {
                warn!("failed to remove PID file after failed start: {}", remove_err);
            }
            return Err(e);
        }

        debug!(pid, "daemon started");
        Ok(pid)
    }

    /// Watch the fresh child for `startup_wait`; it must not exit in that window
    fn wait_for_startup(&self, child: &mut Child) -> Result<(), DaemonError> {
        let deadline = process::deadline(self.setup.startup_wait);

        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    return Err(DaemonError::detach_failure(format!(
                        "daemon process exited during startup ({})",
                        status
                    )));
                }
                Ok(None) => {}
                Err(e) => {
                    return Err(DaemonError::detach_failure_with_source(
                        "failed to check daemon process",
                        e,
                    ));
                }
            }

            if !process::poll_until(deadline, self.setup.poll_interval) {
                return Ok(());
            }
        }
    }

    /// Stop the running daemon and remove its pidfile
    ///
    /// Returns the PID that was stopped.
    pub fn kill(&self) -> Result<u32, DaemonError> {
        let pid = self.status();
        if pid == 0 {
            return Err(DaemonError::NotRunning);
        }

        process::terminate(
            pid,
            self.setup.stop_timeout,
            self.setup.poll_interval,
            self.setup.escalation,
        )?;

        if let Err(e) = pidfile::remove_pid(&self.setup.pidfile) {
            warn!("failed to remove PID file: {}", e);
        }

        Ok(pid)
    }
}

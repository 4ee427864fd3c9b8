//! Daemon plugin configuration
//!
//! `DaemonSettings` come from the kernel configuration file (`[plugins.daemon]`);
//! `DaemonConfig` is the per-invocation view built from parsed options.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hearth_plugin_api::daemon::{DaemonError, DaemonSetup, Escalation};
use hearth_plugin_api::{KernelContext, PluginError, PluginResult};
use serde::{Deserialize, Serialize};

use crate::args::strip_daemon_flag;

pub const OPT_DAEMON: &str = "daemon";
pub const OPT_KILL: &str = "daemon-kill";
pub const OPT_PIDFILE: &str = "daemon-pidfile";

/// Tunable timings of the daemon plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonSettings {
    /// How long a fresh daemon must survive to count as started (milliseconds)
    pub startup_wait_ms: u64,
    /// How long to wait for a killed daemon to exit (seconds)
    pub stop_timeout_secs: u64,
    /// Interval between liveness checks (milliseconds)
    pub poll_interval_ms: u64,
    /// Send SIGKILL when the daemon outlives SIGTERM
    pub force_kill: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            startup_wait_ms: 500,
            stop_timeout_secs: 2,
            poll_interval_ms: 50,
            force_kill: false,
        }
    }
}

/// What this invocation asks the controller to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Nothing,
}

/// Daemon options of one invocation. Immutable once built.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub enable_daemon: bool,
    pub kill_daemon: bool,
    /// Absolute path of the pidfile
    pub pidfile_path: PathBuf,
    /// Original arguments minus `--daemon`
    pub program_args: Vec<String>,
    /// Executable re-run in the background
    pub program: PathBuf,
    /// Name used in console messages
    pub program_name: String,
    pub settings: DaemonSettings,
}

/// `<basedir>/<program>.pid`
pub fn default_pidfile(basedir: &Path, program: &str) -> PathBuf {
    basedir.join(format!("{}.pid", program))
}

impl DaemonConfig {
    /// Build the config from the kernel context
    pub fn from_context(ctx: &KernelContext, settings: DaemonSettings) -> PluginResult<Self> {
        let pidfile = match ctx.options.value(OPT_PIDFILE) {
            Some("") => {
                return Err(PluginError::invalid_option(OPT_PIDFILE, "path is empty"));
            }
            Some(path) => PathBuf::from(path),
            None => default_pidfile(&ctx.basedir, &ctx.program),
        };

        Ok(Self {
            enable_daemon: ctx.options.flag(OPT_DAEMON),
            kill_daemon: ctx.options.flag(OPT_KILL),
            pidfile_path: std::path::absolute(pidfile)?,
            program_args: strip_daemon_flag(ctx.args()),
            program: std::env::current_exe()?,
            program_name: ctx.program.clone(),
            settings,
        })
    }

    /// Decide between start, stop and nothing
    ///
    /// Both flags at once is rejected rather than picking one.
    pub fn action(&self) -> Result<Action, DaemonError> {
        match (self.enable_daemon, self.kill_daemon) {
            (true, true) => Err(DaemonError::ConflictingFlags),
            (true, false) => Ok(Action::Start),
            (false, true) => Ok(Action::Stop),
            (false, false) => Ok(Action::Nothing),
        }
    }

    /// Setup for the daemonization library
    pub fn daemon_setup(&self) -> DaemonSetup {
        DaemonSetup::new(&self.program, &self.pidfile_path)
            .with_args(self.program_args.clone())
            .with_startup_wait(Duration::from_millis(self.settings.startup_wait_ms))
            .with_stop_timeout(Duration::from_secs(self.settings.stop_timeout_secs))
            .with_poll_interval(Duration::from_millis(self.settings.poll_interval_ms))
            .with_escalation(if self.settings.force_kill {
                Escalation::Kill
            } else {
                Escalation::None
            })
    }
}

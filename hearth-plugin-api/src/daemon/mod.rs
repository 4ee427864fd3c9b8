//! Daemonization helpers for plugins
//!
//! Everything a plugin needs to put the kernel in the background and take it down
//! again, built on a pidfile:
//!
//! 1. **Low-level utilities** (`pidfile`, `process`, `spawn`) - pidfile I/O,
//!    liveness probes and signals, detached spawning
//! 2. **Daemon handle** (`handle`) - start/status/kill against one pidfile
//!
//! All operations are synchronous. Waiting for a daemon to come up or go away is
//! a bounded poll, never an open-ended wait.
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth_plugin_api::daemon::{Daemon, DaemonSetup};
//!
//! let daemon = Daemon::setup(
//!     DaemonSetup::new("/usr/local/bin/app", "/srv/app/app.pid")
//!         .with_args(vec!["--port".into(), "8080".into()]),
//! );
//!
//! match daemon.status() {
//!     0 => println!("started as {}", daemon.start()?),
//!     pid => println!("already running as {pid}"),
//! }
//! ```

pub mod handle;
pub mod pidfile;
pub mod process;
pub mod spawn;

use thiserror::Error;

// Re-export commonly used types
pub use handle::{Daemon, DaemonSetup};
pub use pidfile::{read_pid, remove_pid, resolve_pid_status, write_pid};
pub use process::Escalation;
pub use spawn::{DaemonSpawnConfig, spawn_detached};

/// Errors raised while starting or stopping a daemon
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("already running as daemon under PID {pid}")]
    AlreadyRunning { pid: u32 },

    #[error("daemon not running")]
    NotRunning,

    #[error("{message}")]
    DetachFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{message} (PID: {pid})")]
    SignalFailure {
        pid: u32,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("--daemon and --daemon-kill are mutually exclusive")]
    ConflictingFlags,
}

impl DaemonError {
    /// Create a detach failure
    pub fn detach_failure(message: impl Into<String>) -> Self {
        Self::DetachFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Create a detach failure with source
    pub fn detach_failure_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DetachFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a signal failure
    pub fn signal_failure(pid: u32, message: impl Into<String>) -> Self {
        Self::SignalFailure {
            pid,
            message: message.into(),
            source: None,
        }
    }

    /// Create a signal failure with source
    pub fn signal_failure_with_source(
        pid: u32,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::SignalFailure {
            pid,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// The error message followed by its chain of causes, `": "`-separated
    pub fn describe(&self) -> String {
        let mut text = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            text.push_str(": ");
            text.push_str(&cause.to_string());
            source = cause.source();
        }
        text
    }
}

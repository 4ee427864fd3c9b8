//! Detached process spawning

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use tracing::info;

/// Configuration for spawning a daemon process
#[derive(Debug, Clone)]
pub struct DaemonSpawnConfig {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments passed to the executable
    pub args: Vec<String>,
}

impl DaemonSpawnConfig {
    /// Create a new daemon spawn configuration
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }
}

/// Spawn a detached background process
///
/// Standard input, output and error go to the null device. On Unix the child
/// starts a new session, so it has no controlling terminal and does not get
/// the terminal's hangup or interrupt signals.
///
/// Returns the spawned child process handle, or an error if spawning fails.
pub fn spawn_detached(config: &DaemonSpawnConfig) -> Result<Child, std::io::Error> {
    let mut command = Command::new(&config.program);
    command
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        // setsid() is async-signal-safe, so calling it between fork and exec is sound
        unsafe {
            command.pre_exec(|| {
                nix::unistd::setsid()
                    .map(|_| ())
                    .map_err(std::io::Error::from)
            });
        }
    }

    let child = command.spawn().map_err(|e| {
        std::io::Error::new(
            e.kind(),
            format!(
                "Failed to spawn daemon process '{}': {}",
                config.program.display(),
                e
            ),
        )
    })?;

    info!(pid = child.id(), program = %config.program.display(), "spawned detached process");
    Ok(child)
}

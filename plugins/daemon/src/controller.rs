//! Daemon controller
//!
//! Turns `--daemon` / `--daemon-kill` into a start or stop of the background
//! instance. Each invocation goes
//! `idle -> checking pidfile -> {starting | stopping | rejected} -> exit code`;
//! starting and stopping always end the process.

use std::path::Path;

use hearth_plugin_api::daemon::{Daemon, DaemonError, pidfile};
use hearth_plugin_api::{Lifecycle, Termination};
use tracing::{debug, info};

use crate::config::{Action, DaemonConfig};

/// PID of the running daemon recorded at `pidfile_path`, or 0
pub fn resolve_pid_status(pidfile_path: &Path) -> u32 {
    pidfile::resolve_pid_status(pidfile_path)
}

/// Run the controller for one invocation
///
/// `Lifecycle::Continue` only when neither flag is set; everything else ends the
/// process with the returned termination.
pub fn run(config: &DaemonConfig) -> Lifecycle {
    match config.action() {
        Ok(Action::Nothing) => Lifecycle::Continue,
        Ok(Action::Start) => Lifecycle::Exit(start_daemon(config)),
        Ok(Action::Stop) => Lifecycle::Exit(stop_daemon(config)),
        Err(e) => Lifecycle::Exit(Termination::failure(format!(
            "{}: ERROR: {}",
            config.program_name, e
        ))),
    }
}

/// Re-run the program in the background and record its PID
pub fn start_daemon(config: &DaemonConfig) -> Termination {
    let name = &config.program_name;
    debug!(
        pidfile = %config.pidfile_path.display(),
        args = ?config.program_args,
        "daemonizing"
    );

    let daemon = Daemon::setup(config.daemon_setup());
    match daemon.start() {
        Ok(pid) => {
            info!(pid, "daemonized");
            Termination::success(format!("{}: OK: daemonized (PID: {})", name, pid))
        }
        Err(e @ DaemonError::AlreadyRunning { .. }) => {
            Termination::failure(format!("{}: ERROR: {}", name, e))
        }
        Err(e) => Termination::failure(format!(
            "{}: ERROR: error during daemonizing: {}",
            name,
            e.describe()
        )),
    }
}

/// Signal the recorded daemon and wait for it to go away
pub fn stop_daemon(config: &DaemonConfig) -> Termination {
    let name = &config.program_name;
    debug!(pidfile = %config.pidfile_path.display(), "killing daemon");

    let daemon = Daemon::setup(config.daemon_setup());
    match daemon.kill() {
        Ok(pid) => {
            info!(pid, "daemon killed");
            Termination::success(format!("{}: OK: daemon killed (PID: {})", name, pid))
        }
        Err(e @ DaemonError::NotRunning) => Termination::failure(format!("{}: ERROR: {}", name, e)),
        Err(e) => Termination::failure(format!(
            "{}: ERROR: error during daemon killing: {}",
            name,
            e.describe()
        )),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::DaemonSettings;
    use std::path::PathBuf;
    use std::process::Command;

    const DEAD_PID: u32 = 999_999_999;

    fn config(dir: &Path, program: &str, args: &[&str]) -> DaemonConfig {
        DaemonConfig {
            enable_daemon: false,
            kill_daemon: false,
            pidfile_path: dir.join("app.pid"),
            program_args: args.iter().map(|a| a.to_string()).collect(),
            program: PathBuf::from(program),
            program_name: "app".to_string(),
            settings: DaemonSettings {
                startup_wait_ms: 200,
                stop_timeout_secs: 2,
                poll_interval_ms: 20,
                force_kill: false,
            },
        }
    }

    /// `sleep 30` that ignores SIGTERM, recorded in the pidfile of `cfg`
    fn spawn_stubborn(cfg: &DaemonConfig) -> std::process::Child {
        let child = Command::new("sh")
            .args(["-c", "trap '' TERM; exec sleep 30"])
            .spawn()
            .unwrap();
        let pid = child.id();

        // SIGTERM is only ignored once the shell has exec'd into sleep
        let cmdline = format!("/proc/{}/cmdline", pid);
        if Path::new("/proc/self").exists() {
            for _ in 0..100 {
                if std::fs::read(&cmdline).is_ok_and(|b| b.starts_with(b"sleep")) {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(10));
            }
        } else {
            std::thread::sleep(std::time::Duration::from_millis(300));
        }

        pidfile::write_pid(&cfg.pidfile_path, pid).unwrap();
        child
    }

    #[test]
    fn test_resolve_pid_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.pid");
        assert_eq!(resolve_pid_status(&path), 0);

        std::fs::write(&path, "garbage").unwrap();
        assert_eq!(resolve_pid_status(&path), 0);

        pidfile::write_pid(&path, DEAD_PID).unwrap();
        assert_eq!(resolve_pid_status(&path), 0);

        pidfile::write_pid(&path, std::process::id()).unwrap();
        assert_eq!(resolve_pid_status(&path), std::process::id());
    }

    #[test]
    fn test_nothing_to_do_continues() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), "sleep", &["30"]);
        assert_eq!(run(&cfg), Lifecycle::Continue);
        assert!(!cfg.pidfile_path.exists());
    }

    #[test]
    fn test_start_refused_when_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "/nonexistent/program", &[]);
        cfg.enable_daemon = true;
        let me = std::process::id();
        pidfile::write_pid(&cfg.pidfile_path, me).unwrap();

        let Lifecycle::Exit(term) = run(&cfg) else {
            panic!("start must end the process");
        };
        assert_eq!(term.code, 1);
        assert_eq!(
            term.message.unwrap(),
            format!("app: ERROR: already running as daemon under PID {}", me)
        );
        assert_eq!(pidfile::read_pid(&cfg.pidfile_path), Some(me));
    }

    #[test]
    fn test_start_then_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &["30"]);
        cfg.enable_daemon = true;

        let term = start_daemon(&cfg);
        assert!(term.is_success(), "{:?}", term);
        let pid = pidfile::read_pid(&cfg.pidfile_path).expect("pidfile written");
        assert_eq!(
            term.message.unwrap(),
            format!("app: OK: daemonized (PID: {})", pid)
        );
        assert_eq!(resolve_pid_status(&cfg.pidfile_path), pid);

        cfg.enable_daemon = false;
        cfg.kill_daemon = true;
        let Lifecycle::Exit(term) = run(&cfg) else {
            panic!("stop must end the process");
        };
        assert_eq!(term.code, 0);
        assert_eq!(
            term.message.unwrap(),
            format!("app: OK: daemon killed (PID: {})", pid)
        );
        assert!(!cfg.pidfile_path.exists());
    }

    #[test]
    fn test_start_failure_reports_cause() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "/nonexistent/program", &[]);
        cfg.enable_daemon = true;

        let term = start_daemon(&cfg);
        assert_eq!(term.code, 1);
        let message = term.message.unwrap();
        assert!(message.starts_with("app: ERROR: error during daemonizing: "));
        assert!(message.contains("/nonexistent/program"));
        assert!(!cfg.pidfile_path.exists());
    }

    #[test]
    fn test_stop_when_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &[]);
        cfg.kill_daemon = true;

        let term = stop_daemon(&cfg);
        assert_eq!(term, Termination::failure("app: ERROR: daemon not running"));

        // Stale pidfile: still not running, nothing gets signalled
        pidfile::write_pid(&cfg.pidfile_path, DEAD_PID).unwrap();
        let term = stop_daemon(&cfg);
        assert_eq!(term, Termination::failure("app: ERROR: daemon not running"));
    }

    #[test]
    fn test_stop_foreign_recorded_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &[]);
        cfg.kill_daemon = true;

        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        pidfile::write_pid(&cfg.pidfile_path, pid).unwrap();

        let term = stop_daemon(&cfg);
        assert!(term.is_success(), "{:?}", term);
        assert!(!cfg.pidfile_path.exists());
        assert_eq!(resolve_pid_status(&cfg.pidfile_path), 0);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &["30"]);
        cfg.enable_daemon = true;
        cfg.kill_daemon = true;

        let Lifecycle::Exit(term) = run(&cfg) else {
            panic!("conflicting flags must end the process");
        };
        assert_eq!(
            term,
            Termination::failure("app: ERROR: --daemon and --daemon-kill are mutually exclusive")
        );
        assert!(!cfg.pidfile_path.exists());
    }

    #[test]
    fn test_stop_times_out_when_daemon_ignores_term() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &[]);
        cfg.kill_daemon = true;
        cfg.settings.stop_timeout_secs = 1;

        let mut child = spawn_stubborn(&cfg);
        let pid = child.id();

        let Lifecycle::Exit(term) = run(&cfg) else {
            panic!("stop must end the process");
        };
        assert_eq!(term.code, 1);
        let message = term.message.unwrap();
        assert!(message.starts_with("app: ERROR: error during daemon killing: "), "{}", message);
        assert!(message.contains(&format!("(PID: {})", pid)));
        assert_eq!(pidfile::read_pid(&cfg.pidfile_path), Some(pid));
        assert_eq!(resolve_pid_status(&cfg.pidfile_path), pid);

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_stop_with_force_kill() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &[]);
        cfg.kill_daemon = true;
        cfg.settings.stop_timeout_secs = 1;
        cfg.settings.force_kill = true;

        let child = spawn_stubborn(&cfg);
        let pid = child.id();

        let term = stop_daemon(&cfg);
        assert_eq!(term, Termination::success(format!("app: OK: daemon killed (PID: {})", pid)));
        assert!(!cfg.pidfile_path.exists());
    }

    #[test]
    fn test_stop_with_huge_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), "sleep", &[]);
        cfg.kill_daemon = true;
        cfg.settings.stop_timeout_secs = u64::MAX;

        let child = Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();
        pidfile::write_pid(&cfg.pidfile_path, pid).unwrap();

        let term = stop_daemon(&cfg);
        assert_eq!(term, Termination::success(format!("app: OK: daemon killed (PID: {})", pid)));
        assert!(!cfg.pidfile_path.exists());
    }
}

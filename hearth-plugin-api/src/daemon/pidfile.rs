//! Pidfile I/O
//!
//! A pidfile holds a single decimal process id. Reads never fail: anything that
//! cannot be turned into a live PID means "not running".

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::process;

/// Read the PID recorded at `path`
///
/// Returns `None` when the file is missing or does not hold a positive PID.
pub fn read_pid(path: &Path) -> Option<u32> {
    let contents = fs::read_to_string(path).ok()?;

    match contents.trim().parse::<u32>() {
        Ok(pid) if pid > 0 && i32::try_from(pid).is_ok() => Some(pid),
        _ => {
            warn!(path = %path.display(), "ignoring unparseable PID file");
            None
        }
    }
}

/// Atomically write `pid` to `path`
///
/// The PID goes to a temporary file in the same directory which is then renamed
/// over `path`, so readers see either the old content or the new, never a
/// partial write. Missing parent directories are created.
pub fn write_pid(path: &Path, pid: u32) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    writeln!(tmp, "{}", pid)?;
    tmp.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o644))?;
    }

    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), pid, "wrote PID file");
    Ok(())
}

/// Remove the pidfile; a file that is already gone is not an error
pub fn remove_pid(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// PID of the running daemon recorded at `path`, or 0 if none is running
///
/// A stale pidfile (naming a process that no longer exists) reads as 0 and is
/// left in place; the next successful start overwrites it.
pub fn resolve_pid_status(path: &Path) -> u32 {
    let Some(pid) = read_pid(path) else {
        debug!(path = %path.display(), "no PID recorded");
        return 0;
    };

    if process::is_alive(pid) {
        pid
    } else {
        debug!(path = %path.display(), pid, "stale PID file");
        0
    }
}

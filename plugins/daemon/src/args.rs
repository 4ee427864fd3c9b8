//! Argument list for the background re-run

/// The flag that asks for daemonization
pub const DAEMON_FLAG: &str = "--daemon";

/// Arguments for the detached process: `args` with every `--daemon` removed
///
/// Leaving the flag in would make the background process daemonize again.
/// Only exact `--daemon` tokens are dropped; `--daemon=<value>` never gets this
/// far because the kernel's parser rejects values on flags. Tokens after a `--`
/// terminator are positional and stay as they are.
pub fn strip_daemon_flag(args: &[String]) -> Vec<String> {
    let mut stripped = Vec::with_capacity(args.len());
    let mut positional = false;

    for arg in args {
        if !positional && arg == DAEMON_FLAG {
            continue;
        }
        if arg == "--" {
            positional = true;
        }
        stripped.push(arg.clone());
    }

    stripped
}

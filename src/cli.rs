//! Command line of the kernel
//!
//! The kernel's own flags are declared with clap's derive API; plugin options are
//! appended at runtime from their `OptionDef`s.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, Parser};

use crate::error::{KernelError, Result};
use crate::plugin::{OptionDef, OptionKind, OptionValue, Options};

#[derive(Parser, Debug)]
#[command(name = "hearth")]
#[command(about = "A small modular application kernel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Base directory of the application
    #[arg(long, value_name = "PATH")]
    pub basedir: Option<PathBuf>,

    /// List loaded plugins and their options
    #[arg(long)]
    pub list_plugins: bool,

    /// Enable debug logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

/// Names plugins may not use for options
pub const RESERVED_OPTIONS: &[&str] = &["basedir", "list-plugins", "verbose", "help", "version"];

/// Command line as strings; an argument that is not UTF-8 is an error, not a panic
pub fn collect_argv<I>(args: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| arg.into_string().map_err(KernelError::InvalidArgument))
        .collect()
}

/// What the kernel needs to know before plugins are loaded
#[derive(Debug, Default, PartialEq)]
pub struct Prescan {
    pub basedir: Option<PathBuf>,
    pub verbose: bool,
}

/// Pick `--basedir` and `--verbose` out of argv ahead of the full parse
///
/// Plugin option defaults depend on the base directory, and logging is set up
/// before plugin discovery, so both are needed before the parser can be built.
/// The full parse later validates the same arguments.
pub fn prescan(argv: &[String]) -> Prescan {
    let mut scan = Prescan::default();
    let mut iter = argv.iter().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => break,
            "--verbose" | "-v" => scan.verbose = true,
            "--basedir" => scan.basedir = iter.next().map(PathBuf::from),
            other => {
                if let Some(dir) = other.strip_prefix("--basedir=") {
                    scan.basedir = Some(PathBuf::from(dir));
                }
            }
        }
    }

    scan
}

/// File stem of argv[0]
pub fn program_name(argv: &[String]) -> String {
    argv.first()
        .and_then(|arg0| Path::new(arg0).file_stem())
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "hearth".to_string())
}

fn option_arg(def: &OptionDef) -> Arg {
    let arg = Arg::new(def.name.clone())
        .long(def.name.clone())
        .help(def.help.clone());

    match def.kind {
        OptionKind::Flag => arg.action(ArgAction::SetTrue),
        OptionKind::Value => {
            let mut arg = arg.action(ArgAction::Set).num_args(1);
            if let Some(default) = &def.default {
                arg = arg.default_value(default.clone());
            }
            if let Some(value_name) = &def.value_name {
                arg = arg.value_name(value_name.clone());
            }
            arg
        }
    }
}

/// The kernel command extended with every plugin option
pub fn build_command(defs: &[OptionDef]) -> Command {
    defs.iter()
        .fold(Cli::command(), |cmd, def| cmd.arg(option_arg(def)))
}

/// Read plugin option values back out of the parse result
pub fn collect_options(matches: &ArgMatches, defs: &[OptionDef]) -> Options {
    defs.iter()
        .filter_map(|def| {
            let value = match def.kind {
                OptionKind::Flag => OptionValue::Flag(matches.get_flag(&def.name)),
                OptionKind::Value => {
                    OptionValue::Value(matches.get_one::<String>(&def.name)?.clone())
                }
            };
            Some((def.name.clone(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::FromArgMatches;

    fn argv(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn daemon_defs() -> Vec<OptionDef> {
        vec![
            OptionDef::flag("daemon", "Run as a daemon (detached from terminal)"),
            OptionDef::flag("daemon-kill", "Kill daemon process"),
            OptionDef::value("daemon-pidfile", "Path to PID file for daemon operation")
                .with_default("/srv/app/hearth.pid")
                .with_value_name("PATH"),
        ]
    }

    #[test]
    fn test_prescan() {
        let scan = prescan(&argv(&["hearth", "--daemon", "--basedir", "/srv/app", "-v"]));
        assert_eq!(scan.basedir, Some(PathBuf::from("/srv/app")));
        assert!(scan.verbose);

        let scan = prescan(&argv(&["hearth", "--basedir=/opt/x"]));
        assert_eq!(scan.basedir, Some(PathBuf::from("/opt/x")));
        assert!(!scan.verbose);

        let scan = prescan(&argv(&["hearth", "--", "--verbose"]));
        assert_eq!(scan, Prescan::default());
    }

    #[test]
    fn test_collect_argv() {
        let args = collect_argv(["hearth".into(), "--daemon".into()]).unwrap();
        assert_eq!(args, vec!["hearth", "--daemon"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_collect_argv_rejects_non_utf8() {
        use std::os::unix::ffi::OsStringExt;

        let bad = OsString::from_vec(b"/tmp/\xffapp.pid".to_vec());
        let err = collect_argv(["hearth".into(), "--daemon-pidfile".into(), bad]).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
        assert!(err.to_string().contains("not valid UTF-8"));
    }

    #[test]
    fn test_program_name() {
        assert_eq!(program_name(&argv(&["/usr/local/bin/myapp"])), "myapp");
        assert_eq!(program_name(&argv(&["./server.bin"])), "server");
        assert_eq!(program_name(&[]), "hearth");
    }

    #[test]
    fn test_plugin_options_parse() {
        let defs = daemon_defs();
        let matches = build_command(&defs)
            .try_get_matches_from(argv(&["hearth", "--daemon", "--basedir", "/srv/app"]))
            .unwrap();

        let cli = Cli::from_arg_matches(&matches).unwrap();
        assert_eq!(cli.basedir, Some(PathBuf::from("/srv/app")));

        let options = collect_options(&matches, &defs);
        assert!(options.flag("daemon"));
        assert!(!options.flag("daemon-kill"));
        assert_eq!(options.value("daemon-pidfile"), Some("/srv/app/hearth.pid"));
    }

    #[test]
    fn test_pidfile_override() {
        let defs = daemon_defs();
        let matches = build_command(&defs)
            .try_get_matches_from(argv(&["hearth", "--daemon-kill", "--daemon-pidfile", "/tmp/x.pid"]))
            .unwrap();

        let options = collect_options(&matches, &defs);
        assert!(options.flag("daemon-kill"));
        assert_eq!(options.value("daemon-pidfile"), Some("/tmp/x.pid"));
    }

    #[test]
    fn test_flag_with_inline_value_is_rejected() {
        let defs = daemon_defs();
        let result = build_command(&defs).try_get_matches_from(argv(&["hearth", "--daemon=true"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_command_is_well_formed() {
        build_command(&daemon_defs()).debug_assert();
    }
}

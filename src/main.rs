use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::FromArgMatches;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use hearth_daemon_plugin::DaemonPlugin;

use crate::cli::Cli;
use crate::error::{KernelError, Result};
use crate::plugin::{KernelContext, Lifecycle};
use crate::plugin_manager::PluginManager;

mod cli;
mod config;
mod display;
mod error;
mod plugin;
mod plugin_manager;
mod service;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(KernelError::Cli(e)) => e.exit(),
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(&format!(": {}", cause));
                source = cause.source();
            }
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    // Ignore a second initialization (only possible in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Base directory: `--basedir`, then the config file, then the executable's directory
fn resolve_basedir(cli: Option<PathBuf>, cfg: &config::Config) -> Result<PathBuf> {
    if let Some(dir) = cli.or_else(|| cfg.basedir.clone()) {
        return std::path::absolute(&dir)
            .map_err(|e| KernelError::io(format!("Invalid base directory {:?}", dir), e));
    }

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        return Ok(exe_dir.to_path_buf());
    }

    std::env::current_dir().map_err(|e| KernelError::io("Failed to resolve base directory", e))
}

fn run() -> Result<ExitCode> {
    let argv = cli::collect_argv(std::env::args_os())?;
    let scan = cli::prescan(&argv);

    init_logging(scan.verbose);

    let cfg: config::Config = confy::load(config::APP_NAME, None)?;
    let basedir = resolve_basedir(scan.basedir, &cfg)?;
    let program = cli::program_name(&argv);
    debug!(basedir = %basedir.display(), program = %program, "resolved kernel context");

    // Initialize plugin manager
    let mut plugin_manager = PluginManager::new();
    plugin_manager.register_static(Arc::new(DaemonPlugin::new()))?;

    // Add plugin search paths
    plugin_manager.add_plugin_path(basedir.join("plugins"));
    for dir in &cfg.plugin_dirs {
        plugin_manager.add_plugin_path(dir);
    }

    // Discover and load plugins
    match plugin_manager.discover_plugins() {
        Ok(loaded) if !loaded.is_empty() => debug!(?loaded, "loaded plugin libraries"),
        Ok(_) => {}
        Err(e) => warn!("Error discovering plugins: {}", e),
    }

    let base_ctx = KernelContext::new(&basedir, &program).with_argv(argv.clone());
    let defs = plugin_manager.option_defs(&base_ctx)?;

    let matches = cli::build_command(&defs).try_get_matches_from(&argv)?;
    let cli = Cli::from_arg_matches(&matches)?;

    if cli.list_plugins {
        println!("{}", display::format_plugins(&plugin_manager.plugin_infos(&base_ctx)));
        return Ok(ExitCode::SUCCESS);
    }

    let ctx = base_ctx.with_options(cli::collect_options(&matches, &defs));

    match plugin_manager.start_all(&ctx, |name| cfg.plugin_config(name))? {
        Lifecycle::Exit(termination) => {
            display::report(&termination);
            Ok(ExitCode::from(termination.code))
        }
        Lifecycle::Continue => {
            info!(program = %program, "all plugins started");
            service::run(cfg.heartbeat())?;
            plugin_manager.unload_all()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

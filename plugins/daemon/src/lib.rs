//! Hearth Daemon Plugin
//!
//! Runs the kernel in the background, or stops a background instance.
//!
//! ## Options
//!
//! - `--daemon` - Run as a daemon (detached from terminal)
//! - `--daemon-kill` - Kill daemon process
//! - `--daemon-pidfile PATH` - Path to PID file (default `<basedir>/<program>.pid`)
//!
//! With either flag set the plugin ends the process: the invoking process exits
//! once the daemon is confirmed started or stopped, and the background instance
//! is a fresh run of the same program without `--daemon`.

pub mod args;
pub mod config;
pub mod controller;

use hearth_plugin_api::{
    Group, KernelContext, Lifecycle, OptionDef, Plugin, PluginResult, export_plugin,
};
use tracing::warn;

use crate::config::{DaemonConfig, DaemonSettings, OPT_DAEMON, OPT_KILL, OPT_PIDFILE};

pub struct DaemonPlugin;

impl DaemonPlugin {
    pub fn new() -> Self {
        Self
    }

    fn settings(ctx: &KernelContext) -> DaemonSettings {
        match ctx.try_get_config::<DaemonSettings>() {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                warn!("invalid daemon settings, using defaults: {}", e);
                DaemonSettings::default()
            }
        }
    }
}

impl Default for DaemonPlugin {
    fn default() -> Self {
        Self::new()
    }
}

impl Plugin for DaemonPlugin {
    fn name(&self) -> &str {
        "daemon"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn description(&self) -> &str {
        "Run as a background daemon or stop a running one"
    }

    fn group(&self) -> Group {
        Group::Boot
    }

    fn options(&self, ctx: &KernelContext) -> Vec<OptionDef> {
        let pidfile = config::default_pidfile(&ctx.basedir, &ctx.program);
        vec![
            OptionDef::flag(OPT_DAEMON, "Run as a daemon (detached from terminal)"),
            OptionDef::flag(OPT_KILL, "Kill daemon process"),
            OptionDef::value(OPT_PIDFILE, "Path to PID file for daemon operation")
                .with_default(pidfile.to_string_lossy())
                .with_value_name("PATH"),
        ]
    }

    fn start(&self, ctx: &mut KernelContext) -> PluginResult<Lifecycle> {
        if !(ctx.options.flag(OPT_DAEMON) || ctx.options.flag(OPT_KILL)) {
            return Ok(Lifecycle::Continue);
        }

        let config = DaemonConfig::from_context(ctx, Self::settings(ctx))?;
        Ok(controller::run(&config))
    }
}

// Export the plugin for dynamic loading
export_plugin!(DaemonPlugin);

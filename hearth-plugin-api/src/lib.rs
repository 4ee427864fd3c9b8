//! Hearth Plugin API
//!
//! This crate provides the core types and traits needed to create plugins for the
//! Hearth kernel, plus the daemonization helpers used by the daemon plugin.
//!
//! # Creating a Plugin
//!
//! 1. Create a new crate with `crate-type = ["cdylib"]`
//! 2. Implement the `Plugin` trait
//! 3. Export the plugin using `export_plugin!` macro
//!
//! # Example
//!
//! ```rust,ignore
//! use hearth_plugin_api::{Plugin, KernelContext, Lifecycle, OptionDef, PluginResult, export_plugin};
//!
//! pub struct GreetPlugin;
//!
//! impl Plugin for GreetPlugin {
//!     fn name(&self) -> &str { "greet" }
//!     fn version(&self) -> &str { "0.1.0" }
//!     fn description(&self) -> &str { "Says hello on startup" }
//!
//!     fn options(&self, _ctx: &KernelContext) -> Vec<OptionDef> {
//!         vec![OptionDef::flag("greet", "Print a greeting before starting")]
//!     }
//!
//!     fn start(&self, ctx: &mut KernelContext) -> PluginResult<Lifecycle> {
//!         if ctx.options.flag("greet") {
//!             println!("Hello from {}!", ctx.program);
//!         }
//!         Ok(Lifecycle::Continue)
//!     }
//! }
//!
//! export_plugin!(GreetPlugin);
//! ```

pub mod daemon;
pub mod options;

use std::path::PathBuf;

use thiserror::Error;

pub use options::{OptionDef, OptionKind, OptionValue, Options};

/// Plugin-specific errors
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid option '{option}': {message}")]
    InvalidOption { option: String, message: String },

    #[error("Daemon error: {0}")]
    Daemon(#[from] daemon::DaemonError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PluginError {
    /// Create an invalid option error
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;

/// Startup group of a plugin. Plugins start in group order, then by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    /// Runs before anything else touches the environment (daemonization, etc.)
    Boot,
    /// Prepares resources the application needs
    Prepare,
    /// Application logic
    Run,
}

/// Context passed to plugins on startup
///
/// Everything in here has been resolved by the kernel before the first plugin
/// runs; plugins treat it as read-only input.
#[derive(Debug, Clone)]
pub struct KernelContext {
    /// Base directory of the application
    pub basedir: PathBuf,
    /// Program name (file stem of argv[0])
    pub program: String,
    /// The original invocation, argv[0] included
    pub argv: Vec<String>,
    /// Parsed values of every registered option
    pub options: Options,
    /// Plugin configuration as JSON string (deserialized by plugin)
    pub config_json: Option<String>,
}

impl KernelContext {
    pub fn new(basedir: impl Into<PathBuf>, program: impl Into<String>) -> Self {
        Self {
            basedir: basedir.into(),
            program: program.into(),
            argv: Vec::new(),
            options: Options::default(),
            config_json: None,
        }
    }

    pub fn with_argv(mut self, argv: Vec<String>) -> Self {
        self.argv = argv;
        self
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn with_config(mut self, config_json: impl Into<String>) -> Self {
        self.config_json = Some(config_json.into());
        self
    }

    /// Invocation arguments without argv[0]
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// Deserialize configuration from JSON
    /// Returns default if no config is set or parsing fails
    pub fn get_config<T: serde::de::DeserializeOwned + Default>(&self) -> T {
        self.config_json
            .as_ref()
            .and_then(|json| serde_json::from_str(json).ok())
            .unwrap_or_default()
    }

    /// Try to deserialize configuration, returning an error on failure
    pub fn try_get_config<T: serde::de::DeserializeOwned>(&self) -> PluginResult<Option<T>> {
        match &self.config_json {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

/// How the process should end when a plugin stops startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    /// Process exit code
    pub code: u8,
    /// Message for the console (stdout on success, stderr otherwise)
    pub message: Option<String>,
}

impl Termination {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            code: 0,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            code: 1,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == 0
    }
}

/// Result of starting a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    /// Keep booting; the kernel moves on to the next plugin
    Continue,
    /// Stop here and end the process. No further plugin or application code runs.
    Exit(Termination),
}

/// The main Plugin trait that all plugins must implement
pub trait Plugin: Send + Sync {
    /// Returns the plugin's unique name
    fn name(&self) -> &str;

    /// Returns the plugin's version string
    fn version(&self) -> &str;

    /// Returns a short description of the plugin
    fn description(&self) -> &str;

    /// Startup group; defaults to `Group::Run`
    fn group(&self) -> Group {
        Group::Run
    }

    /// Command-line options this plugin contributes to the kernel
    ///
    /// Called before parsing, so `ctx.options` is still empty; `basedir` and
    /// `program` are already resolved and can be used for defaults.
    fn options(&self, _ctx: &KernelContext) -> Vec<OptionDef> {
        Vec::new()
    }

    /// Called once the kernel has parsed options and resolved its context
    fn start(&self, ctx: &mut KernelContext) -> PluginResult<Lifecycle>;

    /// Called when the plugin is loaded (optional initialization)
    fn on_load(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Called when the plugin is unloaded (optional cleanup)
    fn on_unload(&self) -> PluginResult<()> {
        Ok(())
    }
}

/// Raw plugin data for FFI - contains pointer and vtable as separate values
#[repr(C)]
pub struct RawPlugin {
    pub data: *mut (),
    pub vtable: *const (),
}

// Safety: RawPlugin is just pointers, the actual safety is managed by the Plugin trait bounds
unsafe impl Send for RawPlugin {}
unsafe impl Sync for RawPlugin {}

impl RawPlugin {
    /// Create a RawPlugin from a boxed trait object
    ///
    /// The returned RawPlugin must be converted back using `into_boxed()`
    pub fn from_boxed(plugin: Box<dyn Plugin>) -> Self {
        let raw: *mut dyn Plugin = Box::into_raw(plugin);
        unsafe {
            let parts: (*mut (), *const ()) = std::mem::transmute(raw);
            Self {
                data: parts.0,
                vtable: parts.1,
            }
        }
    }

    /// Convert back to a boxed trait object
    ///
    /// # Safety
    /// Must only be called once with a RawPlugin from `from_boxed()`
    pub unsafe fn into_boxed(self) -> Box<dyn Plugin> {
        unsafe {
            let raw: *mut dyn Plugin = std::mem::transmute((self.data, self.vtable));
            Box::from_raw(raw)
        }
    }

    pub fn is_null(&self) -> bool {
        self.data.is_null()
    }
}

/// Plugin entry point function type
pub type PluginCreateFn = unsafe extern "C" fn() -> RawPlugin;

/// Plugin destruction function type
pub type PluginDestroyFn = unsafe extern "C" fn(RawPlugin);

/// Symbol the kernel looks up in a plugin library
pub const PLUGIN_CREATE_SYMBOL: &[u8] = b"hearth_plugin_create";

/// Symbol the kernel calls to free a plugin created by the library
pub const PLUGIN_DESTROY_SYMBOL: &[u8] = b"hearth_plugin_destroy";

/// Macro to export a plugin from a cdylib crate
///
/// # Example
/// ```rust,ignore
/// use hearth_plugin_api::{Plugin, export_plugin};
///
/// struct MyPlugin;
/// impl Plugin for MyPlugin { /* ... */ }
///
/// export_plugin!(MyPlugin);
/// ```
#[macro_export]
macro_rules! export_plugin {
    ($plugin_type:ty) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn hearth_plugin_create() -> $crate::RawPlugin {
            let plugin: Box<dyn $crate::Plugin> = Box::new(<$plugin_type>::new());
            $crate::RawPlugin::from_boxed(plugin)
        }

        #[unsafe(no_mangle)]
        pub extern "C" fn hearth_plugin_destroy(plugin: $crate::RawPlugin) {
            unsafe {
                let _ = plugin.into_boxed();
            }
        }
    };
}

/// Plugin metadata for listing
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
    pub group: Group,
    pub options: Vec<OptionDef>,
}

impl PluginInfo {
    pub fn from_plugin(plugin: &dyn Plugin, ctx: &KernelContext) -> Self {
        Self {
            name: plugin.name().to_string(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
            group: plugin.group(),
            options: plugin.options(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    impl Plugin for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn version(&self) -> &str {
            "0.0.1"
        }

        fn description(&self) -> &str {
            "Test plugin"
        }

        fn options(&self, _ctx: &KernelContext) -> Vec<OptionDef> {
            vec![OptionDef::flag("echo", "Echo and exit")]
        }

        fn start(&self, ctx: &mut KernelContext) -> PluginResult<Lifecycle> {
            if ctx.options.flag("echo") {
                return Ok(Lifecycle::Exit(Termination::success(ctx.program.clone())));
            }
            Ok(Lifecycle::Continue)
        }
    }

    #[derive(serde::Deserialize, Default, Debug, PartialEq)]
    struct Settings {
        #[serde(default)]
        level: u32,
    }

    #[test]
    fn test_context_args_skip_program() {
        let ctx = KernelContext::new("/srv/app", "app").with_argv(vec![
            "/srv/app/app".into(),
            "--daemon".into(),
            "--port".into(),
            "80".into(),
        ]);
        assert_eq!(ctx.args(), &["--daemon", "--port", "80"]);

        let empty = KernelContext::new("/srv/app", "app");
        assert!(empty.args().is_empty());
    }

    #[test]
    fn test_get_config_falls_back_to_default() {
        let ctx = KernelContext::new("/tmp", "app").with_config("not json");
        let settings: Settings = ctx.get_config();
        assert_eq!(settings, Settings::default());
        assert!(ctx.try_get_config::<Settings>().is_err());

        let ctx = KernelContext::new("/tmp", "app").with_config(r#"{"level": 3}"#);
        let settings: Settings = ctx.get_config();
        assert_eq!(settings.level, 3);
    }

    #[test]
    fn test_raw_plugin_round_trip() {
        let raw = RawPlugin::from_boxed(Box::new(Echo));
        assert!(!raw.is_null());
        let plugin = unsafe { raw.into_boxed() };
        assert_eq!(plugin.name(), "echo");
        assert_eq!(plugin.group(), Group::Run);
    }

    #[test]
    fn test_start_returns_exit_when_flag_set() {
        let mut options = Options::default();
        options.insert("echo", OptionValue::Flag(true));
        let mut ctx = KernelContext::new("/tmp", "app").with_options(options);

        let result = Echo.start(&mut ctx).unwrap();
        assert_eq!(result, Lifecycle::Exit(Termination::success("app")));

        let mut ctx = KernelContext::new("/tmp", "app");
        assert_eq!(Echo.start(&mut ctx).unwrap(), Lifecycle::Continue);
    }

    #[test]
    fn test_plugin_info() {
        let info = PluginInfo::from_plugin(&Echo, &KernelContext::new("/tmp", "app"));
        assert_eq!(info.name, "echo");
        assert_eq!(info.options.len(), 1);
        assert_eq!(info.options[0].name, "echo");
    }

    #[test]
    fn test_group_ordering() {
        assert!(Group::Boot < Group::Prepare);
        assert!(Group::Prepare < Group::Run);
    }
}

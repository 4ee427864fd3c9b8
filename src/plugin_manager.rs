use std::collections::{HashMap, HashSet};
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use tracing::{debug, warn};

use crate::cli::RESERVED_OPTIONS;
use crate::error::{KernelError, Result};
use crate::plugin::{
    KernelContext, Lifecycle, OptionDef, PLUGIN_CREATE_SYMBOL, PLUGIN_DESTROY_SYMBOL, Plugin,
    PluginCreateFn, PluginDestroyFn, PluginInfo, RawPlugin,
};

/// Holds a dynamically loaded plugin and its library handle
///
/// The plugin is handed back to the library's destroy function, when it has
/// one, so it is freed by the code that allocated it. The library outlives it.
struct DynamicPlugin {
    plugin: ManuallyDrop<Box<dyn Plugin>>,
    destroy: Option<PluginDestroyFn>,
    #[allow(dead_code)]
    library: Library,
}

impl Drop for DynamicPlugin {
    fn drop(&mut self) {
        let plugin = unsafe { ManuallyDrop::take(&mut self.plugin) };
        match self.destroy {
            Some(destroy) => unsafe { destroy(RawPlugin::from_boxed(plugin)) },
            None => drop(plugin),
        }
    }
}

/// Manages plugin discovery, loading, option collection and startup
pub struct PluginManager {
    /// Static plugins (compiled into the binary)
    static_plugins: HashMap<String, Arc<dyn Plugin>>,
    /// Dynamically loaded plugins
    dynamic_plugins: HashMap<String, DynamicPlugin>,
    /// Plugin search paths
    plugin_paths: Vec<PathBuf>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self {
            static_plugins: HashMap::new(),
            dynamic_plugins: HashMap::new(),
            plugin_paths: Vec::new(),
        }
    }

    /// Add a directory to search for plugins
    pub fn add_plugin_path(&mut self, path: impl Into<PathBuf>) {
        self.plugin_paths.push(path.into());
    }

    /// Register a static plugin (compiled into the binary)
    pub fn register_static(&mut self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();

        if self.has_plugin(&name) {
            return Err(KernelError::plugin(format!(
                "Plugin '{}' is already registered",
                name
            )));
        }

        plugin
            .on_load()
            .map_err(|e| KernelError::plugin_with_source(format!("Plugin '{}' failed to load", name), e))?;
        self.static_plugins.insert(name, plugin);
        Ok(())
    }

    /// Load a dynamic plugin from a library file
    ///
    /// # Safety
    /// This function loads and executes code from an external library.
    /// Only load plugins from trusted sources.
    pub fn load_dynamic(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let library = unsafe {
            Library::new(path).map_err(|e| {
                KernelError::plugin_with_source(format!("Failed to load plugin from {:?}", path), e)
            })?
        };

        let create_fn: libloading::Symbol<PluginCreateFn> = unsafe {
            library.get(PLUGIN_CREATE_SYMBOL).map_err(|e| {
                KernelError::plugin_with_source(
                    format!("Plugin {:?} missing 'hearth_plugin_create' symbol", path),
                    e,
                )
            })?
        };

        let plugin: Box<dyn Plugin> = unsafe {
            let raw: RawPlugin = create_fn();
            if raw.is_null() {
                return Err(KernelError::plugin(format!(
                    "Plugin {:?} returned null from create function",
                    path
                )));
            }
            raw.into_boxed()
        };

        let destroy = unsafe {
            library
                .get::<PluginDestroyFn>(PLUGIN_DESTROY_SYMBOL)
                .map(|symbol| *symbol)
                .ok()
        };
        if destroy.is_none() {
            warn!(path = %path.display(), "plugin has no destroy function, dropping it in the kernel");
        }

        let name = plugin.name().to_string();
        let dynamic = DynamicPlugin {
            plugin: ManuallyDrop::new(plugin),
            destroy,
            library,
        };

        if self.has_plugin(&name) {
            return Err(KernelError::plugin(format!(
                "Plugin '{}' is already registered",
                name
            )));
        }

        debug!(plugin = %name, path = %path.display(), "loaded dynamic plugin");
        self.dynamic_plugins.insert(name, dynamic);

        Ok(())
    }

    /// Discover and load all plugins from registered paths
    pub fn discover_plugins(&mut self) -> Result<Vec<String>> {
        let mut loaded = Vec::new();

        for path in self.plugin_paths.clone() {
            if !path.exists() {
                continue;
            }

            let entries = std::fs::read_dir(&path).map_err(|e| {
                KernelError::io(format!("Failed to read plugin directory {:?}", path), e)
            })?;

            for entry in entries.flatten() {
                let file_path = entry.path();
                if !is_plugin_library(&file_path) {
                    continue;
                }

                match self.load_dynamic(&file_path) {
                    Ok(()) => loaded.push(file_path.display().to_string()),
                    // A library of a plugin that is already compiled in
                    Err(KernelError::Plugin { message, .. }) if message.contains("already registered") => {
                        debug!(path = %file_path.display(), "skipping duplicate plugin");
                    }
                    Err(e) => warn!("Failed to load plugin {:?}: {}", file_path, e),
                }
            }
        }

        Ok(loaded)
    }

    /// All registered plugins in startup order: by group, then by name
    pub fn plugins(&self) -> Vec<&dyn Plugin> {
        let mut plugins: Vec<&dyn Plugin> =
            self.static_plugins.values().map(|p| p.as_ref()).collect();

        plugins.extend(self.dynamic_plugins.values().map(|d| &**d.plugin as &dyn Plugin));
        plugins.sort_by(|a, b| (a.group(), a.name()).cmp(&(b.group(), b.name())));

        plugins
    }

    /// Get plugin info for all registered plugins
    pub fn plugin_infos(&self, ctx: &KernelContext) -> Vec<PluginInfo> {
        self.plugins()
            .into_iter()
            .map(|p| PluginInfo::from_plugin(p, ctx))
            .collect()
    }

    /// Check if a plugin exists
    pub fn has_plugin(&self, name: &str) -> bool {
        self.static_plugins.contains_key(name) || self.dynamic_plugins.contains_key(name)
    }

    /// Options of every plugin, checked for clashes
    pub fn option_defs(&self, ctx: &KernelContext) -> Result<Vec<OptionDef>> {
        let mut seen: HashSet<String> = RESERVED_OPTIONS.iter().map(|s| s.to_string()).collect();
        let mut defs = Vec::new();

        for plugin in self.plugins() {
            for def in plugin.options(ctx) {
                if !seen.insert(def.name.clone()) {
                    return Err(KernelError::plugin(format!(
                        "Plugin '{}' registers option '{}' which is already taken",
                        plugin.name(),
                        def.long()
                    )));
                }
                defs.push(def);
            }
        }

        Ok(defs)
    }

    /// Start every plugin in order
    ///
    /// Each plugin gets its own settings from `plugin_config`. Stops at the first
    /// plugin that asks for the process to end and returns its `Lifecycle::Exit`.
    pub fn start_all<F>(&self, ctx: &KernelContext, plugin_config: F) -> Result<Lifecycle>
    where
        F: Fn(&str) -> Option<String>,
    {
        for plugin in self.plugins() {
            let name = plugin.name();
            let mut plugin_ctx = ctx.clone();
            plugin_ctx.config_json = plugin_config(name);

            debug!(plugin = %name, group = ?plugin.group(), "starting plugin");
            let lifecycle = plugin.start(&mut plugin_ctx).map_err(|e| {
                KernelError::plugin_with_source(format!("Plugin '{}' failed to start", name), e)
            })?;

            if let Lifecycle::Exit(termination) = lifecycle {
                debug!(plugin = %name, code = termination.code, "plugin ended startup");
                return Ok(Lifecycle::Exit(termination));
            }
        }

        Ok(Lifecycle::Continue)
    }

    /// Unload all plugins (called on shutdown)
    pub fn unload_all(&mut self) -> Result<()> {
        for (name, plugin) in &self.static_plugins {
            if let Err(e) = plugin.on_unload() {
                warn!("Plugin '{}' failed to unload: {}", name, e);
            }
        }
        // on_unload() is skipped for dynamic plugins to keep error types off the FFI boundary
        self.static_plugins.clear();
        self.dynamic_plugins.clear();
        Ok(())
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        if let Err(e) = self.unload_all() {
            eprintln!("Error during plugin manager cleanup: {}", e);
        }
    }
}

fn is_plugin_library(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("so") => cfg!(target_os = "linux"),
        Some("dylib") => cfg!(target_os = "macos"),
        Some("dll") => cfg!(target_os = "windows"),
        _ => false,
    }
}

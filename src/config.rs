//! Kernel configuration, loaded with confy from the user's config directory

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Name under which confy stores the configuration
pub const APP_NAME: &str = "hearth";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    /// Base directory of the application (defaults to the executable's directory)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basedir: Option<PathBuf>,
    /// Extra directories searched for plugin libraries
    pub plugin_dirs: Vec<PathBuf>,
    /// Interval of the service heartbeat log line
    pub heartbeat_secs: u64,
    /// Per-plugin settings, keyed by plugin name
    pub plugins: BTreeMap<String, serde_json::Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            basedir: None,
            plugin_dirs: Vec::new(),
            heartbeat_secs: 60,
            plugins: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Settings of one plugin as JSON, for `KernelContext::with_config`
    pub fn plugin_config(&self, name: &str) -> Option<String> {
        self.plugins
            .get(name)
            .and_then(|value| serde_json::to_string(value).ok())
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.basedir.is_none());
        assert!(config.plugin_dirs.is_empty());
        assert_eq!(config.heartbeat(), Duration::from_secs(60));
        assert_eq!(config.plugin_config("daemon"), None);
    }

    #[test]
    fn test_zero_heartbeat_is_clamped() {
        let config = Config {
            heartbeat_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.heartbeat(), Duration::from_secs(1));
    }

    #[test]
    fn test_plugin_config_from_json() {
        let config: Config = serde_json::from_str(
            r#"{"plugins": {"daemon": {"startup_wait_ms": 250, "stop_timeout_secs": 4}}}"#,
        )
        .unwrap();

        let json = config.plugin_config("daemon").unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["startup_wait_ms"], 250);
        assert_eq!(value["stop_timeout_secs"], 4);
        assert_eq!(config.heartbeat_secs, 60);
    }
}

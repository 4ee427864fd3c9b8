//! Command-line options contributed by plugins
//!
//! Plugins describe their options with [`OptionDef`]; the kernel turns those into
//! parser arguments and hands the parsed values back as [`Options`].

use std::collections::HashMap;

/// Kind of a command-line option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    /// Presence flag (`--name`), false unless given
    Flag,
    /// Option taking one value (`--name VALUE`)
    Value,
}

/// Definition of a command-line option
#[derive(Debug, Clone)]
pub struct OptionDef {
    /// Long name without the leading dashes (e.g. "daemon-pidfile")
    pub name: String,
    pub kind: OptionKind,
    /// Help text
    pub help: String,
    /// Default for `Value` options
    pub default: Option<String>,
    /// Placeholder shown in help (e.g. "PATH")
    pub value_name: Option<String>,
}

impl OptionDef {
    pub fn flag(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::Flag,
            help: help.into(),
            default: None,
            value_name: None,
        }
    }

    pub fn value(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: OptionKind::Value,
            help: help.into(),
            default: None,
            value_name: None,
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_value_name(mut self, value_name: impl Into<String>) -> Self {
        self.value_name = Some(value_name.into());
        self
    }

    /// The option as typed on the command line
    pub fn long(&self) -> String {
        format!("--{}", self.name)
    }
}

/// A parsed option value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Flag(bool),
    Value(String),
}

/// Parsed option values, keyed by long name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options {
    values: HashMap<String, OptionValue>,
}

impl Options {
    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&OptionValue> {
        self.values.get(name)
    }

    /// Value of a flag; unknown names and value options read as false
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.values.get(name), Some(OptionValue::Flag(true)))
    }

    /// Value of a value option, if set
    pub fn value(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::Value(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, OptionValue)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, OptionValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_def_builders() {
        let def = OptionDef::value("daemon-pidfile", "Path to PID file")
            .with_default("/srv/app.pid")
            .with_value_name("PATH");
        assert_eq!(def.kind, OptionKind::Value);
        assert_eq!(def.default.as_deref(), Some("/srv/app.pid"));
        assert_eq!(def.value_name.as_deref(), Some("PATH"));
        assert_eq!(def.long(), "--daemon-pidfile");

        let flag = OptionDef::flag("daemon", "Run as a daemon");
        assert_eq!(flag.kind, OptionKind::Flag);
        assert!(flag.default.is_none());
    }

    #[test]
    fn test_options_lookup() {
        let options: Options = [
            ("daemon", OptionValue::Flag(true)),
            ("daemon-kill", OptionValue::Flag(false)),
            ("daemon-pidfile", OptionValue::Value("/tmp/app.pid".into())),
        ]
        .into_iter()
        .collect();

        assert!(options.flag("daemon"));
        assert!(!options.flag("daemon-kill"));
        assert!(!options.flag("missing"));
        assert!(!options.flag("daemon-pidfile"));
        assert_eq!(options.value("daemon-pidfile"), Some("/tmp/app.pid"));
        assert_eq!(options.value("daemon"), None);
        assert_eq!(options.len(), 3);
    }
}

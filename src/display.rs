//! Console output of the kernel
//!
//! Handles colored status markers and the plugin listing

use colored::*;

use crate::plugin::{OptionKind, PluginInfo, Termination};

/// Check if the given stream is a terminal
pub fn supports_color(stream: atty::Stream) -> bool {
    atty::is(stream)
}

/// Color the `OK:` / `ERROR:` marker of a termination message
pub fn format_termination(message: &str, use_color: bool) -> String {
    if !use_color {
        return message.to_string();
    }

    if let Some((prefix, rest)) = message.split_once(": OK: ") {
        format!("{}: {} {}", prefix, "OK:".green().bold(), rest)
    } else if let Some((prefix, rest)) = message.split_once(": ERROR: ") {
        format!("{}: {} {}", prefix, "ERROR:".red().bold(), rest)
    } else {
        message.to_string()
    }
}

/// Print a termination message on stdout (success) or stderr (failure)
pub fn report(termination: &Termination) {
    let Some(message) = &termination.message else {
        return;
    };

    if termination.is_success() {
        let use_color = supports_color(atty::Stream::Stdout);
        println!("{}", format_termination(message, use_color));
    } else {
        let use_color = supports_color(atty::Stream::Stderr);
        eprintln!("{}", format_termination(message, use_color));
    }
}

/// Format the plugin listing
pub fn format_plugins(plugins: &[PluginInfo]) -> String {
    if plugins.is_empty() {
        return "No plugins loaded.".to_string();
    }

    let mut out = String::from("Loaded plugins:\n");
    for info in plugins {
        out.push_str(&format!(
            "\n  {} v{} ({:?})\n    {}\n",
            info.name, info.version, info.group, info.description
        ));
        if info.options.is_empty() {
            continue;
        }
        out.push_str("    Options:\n");
        for opt in &info.options {
            let value = match (opt.kind, &opt.value_name) {
                (OptionKind::Value, Some(name)) => format!(" <{}>", name),
                (OptionKind::Value, None) => " <VALUE>".to_string(),
                (OptionKind::Flag, _) => String::new(),
            };
            out.push_str(&format!("      {}{} - {}", opt.long(), value, opt.help));
            if let Some(default) = &opt.default {
                out.push_str(&format!(" [default: {}]", default));
            }
            out.push('\n');
        }
    }
    out
}

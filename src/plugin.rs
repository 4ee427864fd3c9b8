//! Plugin types, re-exported from hearth-plugin-api for use inside the kernel

pub use hearth_plugin_api::*;

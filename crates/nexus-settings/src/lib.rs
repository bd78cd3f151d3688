//! # nexus-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`NexusSettings::default()`]
//! 2. **Settings file**: `~/.nexus/settings.json` or an explicit path
//! 3. **Environment variables**: `NEXUS_*` and `GEMINI_API_KEY`

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    deep_merge, load_settings, load_settings_from_path, settings_path, IgnoredOverride,
    LoadedSettings,
};
pub use types::*;

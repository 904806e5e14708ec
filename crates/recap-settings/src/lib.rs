//! # recap-settings
//!
//! Layered configuration for the summarization pipeline:
//! 1. **Compiled defaults**: [`RecapSettings::default()`]
//! 2. **User file**: `~/.recap/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `RECAP_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_under_recap_home() {
        assert!(settings_path().ends_with(".recap/settings.json"));
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(RecapSettings::default().validate().is_ok());
    }
}

//! # webstore-settings
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`WebstoreSettings::default()`]
//! 2. **User file**: `~/.webstore/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WEBSTORE_*` overrides (highest priority)
//!
//! Command-line flags, where a binary offers them, are applied on top by the
//! caller.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_is_under_dot_webstore() {
        let path = settings_path();
        assert!(path.ends_with(".webstore/settings.json"));
    }
}

//! # aci-settings
//!
//! Configuration with layered sources for the ACI event streamer.
//!
//! Settings are loaded from these layers (in priority order, lowest first):
//! 1. **Compiled defaults**: [`AciSettings::default()`]
//! 2. **Settings file**: `~/.aci-stream/settings.json` or an explicit path
//!    (deep-merged over defaults)
//! 3. **Environment variables**: `ACI_*` overrides
//!
//! The binary applies its command-line flags on top and then calls
//! [`AciSettings::validate`].
//!
//! Settings are passed down explicitly; there is no process-wide instance.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

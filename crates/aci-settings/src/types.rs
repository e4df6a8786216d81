//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may be partial; missing fields keep their compiled default.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "apic": { "host": "apic1.example.net", "username": "admin" },
///   "subscription": { "class": "faultInst" },
///   "session": { "restartCooldownSecs": 10 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AciSettings {
    /// Controller address and credentials.
    pub apic: ApicSettings,
    /// Session maintenance timing.
    pub session: SessionSettings,
    /// Which event class to subscribe to.
    pub subscription: SubscriptionSettings,
    /// Log level and log file.
    pub logging: LoggingSettings,
}

impl AciSettings {
    /// Check that the settings describe a runnable session.
    pub fn validate(&self) -> Result<()> {
        if self.apic.host.trim().is_empty() {
            return Err(invalid("apic.host must not be empty"));
        }
        if self.apic.username.is_empty() {
            return Err(invalid("apic.username must not be empty"));
        }
        if self.apic.http_timeout_secs == 0 {
            return Err(invalid("apic.httpTimeoutSecs must be positive"));
        }
        if self.subscription.class.trim().is_empty() {
            return Err(invalid("subscription.class must not be empty"));
        }
        if self.session.tick_ms == 0 {
            return Err(invalid("session.tickMs must be positive"));
        }
        if self.session.token_refresh_secs == 0 {
            return Err(invalid("session.tokenRefreshSecs must be positive"));
        }
        if self.session.subscription_refresh_secs == 0 {
            return Err(invalid("session.subscriptionRefreshSecs must be positive"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> SettingsError {
    SettingsError::InvalidValue(msg.to_string())
}

/// Controller address and credentials.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApicSettings {
    /// Controller host name or address, optionally with `:port`.
    pub host: String,
    /// Login user name.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Per-request HTTP timeout in seconds.
    pub http_timeout_secs: u64,
}

impl Default for ApicSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            username: String::new(),
            password: String::new(),
            http_timeout_secs: 30,
        }
    }
}

impl ApicSettings {
    /// HTTP timeout as a [`Duration`].
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

impl std::fmt::Debug for ApicSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApicSettings")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// Session maintenance timing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Polling tick of the refresh loops, in milliseconds.
    pub tick_ms: u64,
    /// Refresh the login token once it is this many seconds old.
    pub token_refresh_secs: u64,
    /// Refresh the subscription once it is this many seconds old.
    pub subscription_refresh_secs: u64,
    /// Pause between a failed attempt and the next login, in seconds.
    pub restart_cooldown_secs: u64,
    /// Treat a non-2xx status or an error payload in a token refresh reply
    /// as an authentication failure. When off, only transport errors fail.
    pub strict_token_refresh: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            tick_ms: 1_000,
            token_refresh_secs: 60,
            subscription_refresh_secs: 30,
            restart_cooldown_secs: 30,
            strict_token_refresh: true,
        }
    }
}

impl SessionSettings {
    /// Tick as a [`Duration`].
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    /// Token refresh threshold as a [`Duration`].
    pub const fn token_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    /// Subscription refresh threshold as a [`Duration`].
    pub const fn subscription_refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.subscription_refresh_secs)
    }

    /// Restart cooldown as a [`Duration`].
    pub const fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }
}

/// Subscription target.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionSettings {
    /// Managed-object class to subscribe to (e.g. `faultInst`).
    pub class: String,
    /// `page` query parameter of the class query.
    pub page: u32,
    /// `page-size` query parameter of the class query.
    pub page_size: u32,
    /// Additional query parameters (e.g. `query-target-filter`).
    pub filters: BTreeMap<String, String>,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            class: "faultInst".to_string(),
            page: 0,
            page_size: 1,
            filters: BTreeMap::new(),
        }
    }
}

impl SubscriptionSettings {
    /// All query parameters sent with the subscribe call, except the
    /// `subscription=yes` marker.
    pub fn query_params(&self) -> BTreeMap<String, String> {
        let mut params = self.filters.clone();
        let _ = params.insert("page".to_string(), self.page.to_string());
        let _ = params.insert("page-size".to_string(), self.page_size.to_string());
        params
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level when `RUST_LOG` is unset.
    pub level: String,
    /// Whether to also append logs to a file.
    pub to_file: bool,
    /// Log file path. Defaults to `<class>.log` in the working directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            to_file: true,
            file: None,
        }
    }
}

impl LoggingSettings {
    /// Resolve the log file for a subscription class, or `None` when file
    /// logging is off.
    pub fn resolve_file(&self, class: &str) -> Option<PathBuf> {
        if !self.to_file {
            return None;
        }
        Some(
            self.file
                .as_ref()
                .map_or_else(|| PathBuf::from(format!("{class}.log")), PathBuf::from),
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

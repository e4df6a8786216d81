//! Reading `settings.json` and the `ACI_*` environment.
//!
//! [`load_settings_from_path`] layers three sources, later ones winning:
//! compiled [`AciSettings::default()`], the JSON file (when it exists) and
//! the process environment. The file only has to name the keys it changes;
//! [`deep_merge`] fills in the rest from the defaults.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::AciSettings;

const SETTINGS_DIR: &str = ".aci-stream";
const SETTINGS_FILE: &str = "settings.json";

/// `$HOME/.aci-stream/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<AciSettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, then the file at `path`, then the environment.
///
/// A missing file is not an error. An unreadable or malformed one is.
pub fn load_settings_from_path(path: &Path) -> Result<AciSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the settings file, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<AciSettings> {
    let mut layered = serde_json::to_value(AciSettings::default())?;

    match std::fs::read_to_string(path) {
        Ok(content) => {
            debug!(path = %path.display(), "applying settings file");
            let overlay: Value = serde_json::from_str(&content)?;
            layered = deep_merge(layered, overlay);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, keeping defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    Ok(serde_json::from_value(layered)?)
}

/// Overlay `overlay` onto `base`.
///
/// Objects merge key by key. A `null` in the overlay leaves the base value in
/// place. Anything else in the overlay, arrays included, replaces the base.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_maps(base, overlay)),
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

fn merge_maps(mut base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overlay {
        let merged = match base.remove(&key) {
            Some(existing) => deep_merge(existing, value),
            None if value.is_null() => continue,
            None => value,
        };
        let _ = base.insert(key, merged);
    }
    base
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(settings: &mut AciSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `ACI_*` overrides read through `lookup`.
///
/// Empty strings count as unset. Numbers outside their allowed range and
/// unparseable booleans are logged and skipped, so the file or default value
/// stays in effect.
pub fn apply_overrides_from<F>(settings: &mut AciSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Controller ──────────────────────────────────────────────────
    if let Some(v) = env.string("ACI_HOST") {
        settings.apic.host = v;
    }
    if let Some(v) = env.string("ACI_USERNAME") {
        settings.apic.username = v;
    }
    if let Some(v) = env.string("ACI_PASSWORD") {
        settings.apic.password = v;
    }
    if let Some(v) = env.u64("ACI_HTTP_TIMEOUT_SECS", 1, 600) {
        settings.apic.http_timeout_secs = v;
    }

    // ── Session timing ──────────────────────────────────────────────
    if let Some(v) = env.u64("ACI_TICK_MS", 10, 60_000) {
        settings.session.tick_ms = v;
    }
    if let Some(v) = env.u64("ACI_TOKEN_REFRESH_SECS", 1, 86_400) {
        settings.session.token_refresh_secs = v;
    }
    if let Some(v) = env.u64("ACI_SUBSCRIPTION_REFRESH_SECS", 1, 86_400) {
        settings.session.subscription_refresh_secs = v;
    }
    if let Some(v) = env.u64("ACI_RESTART_COOLDOWN_SECS", 0, 86_400) {
        settings.session.restart_cooldown_secs = v;
    }
    if let Some(v) = env.bool("ACI_STRICT_TOKEN_REFRESH") {
        settings.session.strict_token_refresh = v;
    }

    // ── Subscription ────────────────────────────────────────────────
    if let Some(v) = env.string("ACI_CLASS") {
        settings.subscription.class = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("ACI_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("ACI_LOG_FILE") {
        settings.logging.file = Some(v);
    }
}

/// `true`, `yes`, `on`, `1` and their negations, in any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    let val = val.trim();
    ["true", "yes", "on", "1"]
        .iter()
        .any(|t| val.eq_ignore_ascii_case(t))
        .then_some(true)
        .or_else(|| {
            ["false", "no", "off", "0"]
                .iter()
                .any(|f| val.eq_ignore_ascii_case(f))
                .then_some(false)
        })
}

/// `val` as an integer in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let raw = (self.lookup)(name)?;
        let parsed = parse_bool(&raw);
        if parsed.is_none() {
            warn!(var = name, value = %raw, "expected a boolean, keeping previous value");
        }
        parsed
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let raw = (self.lookup)(name)?;
        let parsed = parse_u64_range(&raw, min, max);
        if parsed.is_none() {
            warn!(var = name, value = %raw, min, max, "out of range, keeping previous value");
        }
        parsed
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn file_keys_override_only_what_they_name() {
        let base = serde_json::json!({
            "apic": {"host": "", "httpTimeoutSecs": 30}
        });
        let overlay = serde_json::json!({
            "apic": {"host": "apic1"}
        });
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["apic"]["host"], "apic1");
        assert_eq!(merged["apic"]["httpTimeoutSecs"], 30);
    }

    #[test]
    fn null_keeps_default() {
        let base = serde_json::json!({"session": {"tickMs": 1000}, "logging": {"file": null}});
        let overlay = serde_json::json!({"session": {"tickMs": null}, "extra": null});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["session"]["tickMs"], 1000);
        assert!(merged.get("extra").is_none());
    }

    #[test]
    fn filters_object_replaces_scalar() {
        let base = serde_json::json!({"filters": 1});
        let overlay = serde_json::json!({"filters": {"query-target-filter": "eq(faultInst.severity,\"critical\")"}});
        let merged = deep_merge(base, overlay);
        assert!(merged["filters"].is_object());
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_file_layer(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.session.token_refresh_secs, 60);
        assert!(settings.apic.host.is_empty());
    }

    #[test]
    fn partial_file_is_layered_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{
                "apic": {"host": "apic1.lab", "username": "admin"},
                "session": {"restartCooldownSecs": 5},
                "subscription": {"class": "eventRecord", "filters": {"order-by": "eventRecord.created|desc"}}
            }"#,
        )
        .unwrap();

        let settings = load_file_layer(&path).unwrap();
        assert_eq!(settings.apic.host, "apic1.lab");
        assert_eq!(settings.apic.http_timeout_secs, 30);
        assert_eq!(settings.session.restart_cooldown_secs, 5);
        assert_eq!(settings.session.subscription_refresh_secs, 30);
        assert_eq!(settings.subscription.class, "eventRecord");
        assert_eq!(
            settings.subscription.filters["order-by"],
            "eventRecord.created|desc"
        );
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_file_layer(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn unreadable_path_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_file_layer(dir.path()).unwrap_err();
        assert!(matches!(&err, SettingsError::Read { path, .. } if path == dir.path()));
    }

    #[test]
    fn load_wrong_type_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"tickMs": "fast"}}"#).unwrap();
        assert!(load_file_layer(&path).is_err());
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = AciSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("ACI_HOST", "10.0.0.1"),
                ("ACI_USERNAME", "ops"),
                ("ACI_PASSWORD", "secret"),
                ("ACI_CLASS", "faultDelegate"),
                ("ACI_TOKEN_REFRESH_SECS", "300"),
                ("ACI_STRICT_TOKEN_REFRESH", "off"),
                ("ACI_LOG_FILE", "/tmp/aci.log"),
            ]),
        );
        assert_eq!(settings.apic.host, "10.0.0.1");
        assert_eq!(settings.apic.username, "ops");
        assert_eq!(settings.apic.password, "secret");
        assert_eq!(settings.subscription.class, "faultDelegate");
        assert_eq!(settings.session.token_refresh_secs, 300);
        assert!(!settings.session.strict_token_refresh);
        assert_eq!(settings.logging.file.as_deref(), Some("/tmp/aci.log"));
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = AciSettings::default();
        apply_overrides_from(
            &mut settings,
            env_of(&[
                ("ACI_TICK_MS", "5"),
                ("ACI_HTTP_TIMEOUT_SECS", "never"),
                ("ACI_STRICT_TOKEN_REFRESH", "maybe"),
                ("ACI_HOST", ""),
            ]),
        );
        assert_eq!(settings.session.tick_ms, 1_000);
        assert_eq!(settings.apic.http_timeout_secs, 30);
        assert!(settings.session.strict_token_refresh);
        assert!(settings.apic.host.is_empty());
    }

    #[test]
    fn zero_cooldown_is_allowed_from_env() {
        let mut settings = AciSettings::default();
        apply_overrides_from(&mut settings, env_of(&[("ACI_RESTART_COOLDOWN_SECS", "0")]));
        assert_eq!(settings.session.restart_cooldown_secs, 0);
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool(" on "), Some(true));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("60", 1, 86_400), Some(60));
        assert_eq!(parse_u64_range("0", 1, 86_400), None);
        assert_eq!(parse_u64_range("86401", 1, 86_400), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".aci-stream/settings.json"));
    }
}

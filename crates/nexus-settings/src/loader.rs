//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`NexusSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate
//!
//! The loader runs before logging is initialized, so it records what it
//! skipped in [`LoadedSettings`] and the caller emits it once a subscriber
//! is installed.
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use nexus_core::security::ApiKey;
use nexus_core::PersonaModule;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::NexusSettings;

/// Resolve the default settings file (`~/.nexus/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".nexus").join("settings.json")
}

/// An environment override that was set but could not be used.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IgnoredOverride {
    pub key: &'static str,
    pub value: String,
}

/// Resolved settings plus the loader's own diagnostics.
#[derive(Debug)]
pub struct LoadedSettings {
    pub settings: NexusSettings,
    pub path: PathBuf,
    /// Whether `path` existed and was merged over the defaults.
    pub file_loaded: bool,
    pub ignored: Vec<IgnoredOverride>,
}

impl LoadedSettings {
    /// Emit what the loader saw. Call after the tracing subscriber is set up.
    pub fn log_diagnostics(&self) {
        if self.file_loaded {
            debug!(path = %self.path.display(), "settings loaded from file");
        } else {
            debug!(path = %self.path.display(), "settings file not found, using defaults");
        }
        for ignored in &self.ignored {
            warn!(key = ignored.key, value = %ignored.value, "invalid env var, ignoring");
        }
    }
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<LoadedSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LoadedSettings> {
    let (mut settings, file_loaded) = read_file_layer(path)?;
    let ignored = apply_env_overrides(&mut settings);
    validate(&settings)?;
    Ok(LoadedSettings {
        settings,
        path: path.to_owned(),
        file_loaded,
        ignored,
    })
}

fn read_file_layer(path: &Path) -> Result<(NexusSettings, bool)> {
    let defaults = serde_json::to_value(NexusSettings::default())?;

    let (merged, file_loaded) = if path.exists() {
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        (deep_merge(defaults, user), true)
    } else {
        (defaults, false)
    };

    Ok((serde_json::from_value(merged)?, file_loaded))
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut NexusSettings) -> Vec<IgnoredOverride> {
    apply_overrides_with(settings, |name| std::env::var(name).ok())
}

/// Apply overrides from an arbitrary lookup.
///
/// Invalid values leave the file/default value in place and are returned.
pub fn apply_overrides_with<F>(settings: &mut NexusSettings, lookup: F) -> Vec<IgnoredOverride>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let mut ignored = Vec::new();

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = read("NEXUS_HOST") {
        settings.server.host = v;
    }
    if let Some(raw) = read("NEXUS_PORT") {
        if let Some(v) = parsed(&mut ignored, "NEXUS_PORT", parse_u16_range(&raw, 1, 65535), &raw) {
            settings.server.port = v;
        }
    }
    if let Some(v) = read("NEXUS_INDEX_PATH") {
        settings.server.index_path = v;
    }

    // ── Session ─────────────────────────────────────────────────────
    if let Some(v) = read("NEXUS_MODEL") {
        settings.session.model_id = v;
    }
    if let Some(raw) = read("NEXUS_DEFAULT_MODULE") {
        let module = raw.to_lowercase().parse::<PersonaModule>().ok();
        if let Some(v) = parsed(&mut ignored, "NEXUS_DEFAULT_MODULE", module, &raw) {
            settings.session.default_module = v;
        }
    }
    if let Some(raw) = read("NEXUS_HISTORY_WINDOW") {
        if let Some(v) = parsed(
            &mut ignored,
            "NEXUS_HISTORY_WINDOW",
            parse_usize_range(&raw, 1, 1000),
            &raw,
        ) {
            settings.session.history_window = v;
        }
    }
    if let Some(raw) = read("NEXUS_TEMPERATURE") {
        if let Some(v) = parsed(
            &mut ignored,
            "NEXUS_TEMPERATURE",
            parse_f32_range(&raw, 0.0, 2.0),
            &raw,
        ) {
            settings.session.temperature = v;
        }
    }

    // ── Storage / persona / logging ─────────────────────────────────
    if let Some(v) = read("NEXUS_DB_PATH") {
        settings.storage.database_path = v;
    }
    if let Some(v) = read("NEXUS_MODULES_DIR") {
        settings.persona.modules_dir = v;
    }
    if let Some(v) = read("NEXUS_LOG_LEVEL") {
        settings.logging.level = v;
    }

    // ── Completion API ──────────────────────────────────────────────
    if let Some(v) = read("NEXUS_GEMINI_BASE_URL") {
        settings.completion.base_url = v;
    }
    if let Some(v) = read("GEMINI_API_KEY") {
        settings.completion.api_key = Some(ApiKey::new(v));
    }
    ignored
}

fn parsed<T>(
    ignored: &mut Vec<IgnoredOverride>,
    key: &'static str,
    result: Option<T>,
    raw: &str,
) -> Option<T> {
    if result.is_none() {
        ignored.push(IgnoredOverride {
            key,
            value: raw.to_string(),
        });
    }
    result
}

fn validate(settings: &NexusSettings) -> Result<()> {
    if settings.session.history_window == 0 {
        return Err(SettingsError::InvalidValue(
            "session.historyWindow must be at least 1".into(),
        ));
    }
    if settings.server.max_send_queue == 0 {
        return Err(SettingsError::InvalidValue(
            "server.maxSendQueue must be at least 1".into(),
        ));
    }
    if settings.server.heartbeat_interval_secs == 0 {
        return Err(SettingsError::InvalidValue(
            "server.heartbeatIntervalSecs must be at least 1".into(),
        ));
    }
    if !(0.0..=2.0).contains(&settings.session.temperature) {
        return Err(SettingsError::InvalidValue(format!(
            "session.temperature {} outside 0.0..=2.0",
            settings.session.temperature
        )));
    }
    Ok(())
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `f32` within a closed range.
pub fn parse_f32_range(val: &str, min: f32, max: f32) -> Option<f32> {
    let n: f32 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8000, "host": "0.0.0.0"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "0.0.0.0");
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let (settings, loaded) = read_file_layer(Path::new("/nonexistent/settings.json")).unwrap();
        assert!(!loaded);
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.session.history_window, 10);
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 9090}, "session": {"historyWindow": 4}}"#,
        )
        .unwrap();

        let (settings, loaded) = read_file_layer(&path).unwrap();
        assert!(loaded);
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.session.history_window, 4);
        assert_eq!(settings.session.model_id, "gemini-2.0-flash");
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();

        let result = read_file_layer(&path);
        assert!(matches!(result, Err(SettingsError::Json(_))));
    }

    #[test]
    fn zero_window_fails_validation() {
        let mut settings = NexusSettings::default();
        settings.session.history_window = 0;
        assert!(matches!(
            validate(&settings),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn zero_heartbeat_fails_validation() {
        let mut settings = NexusSettings::default();
        settings.server.heartbeat_interval_secs = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn load_reports_file_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"session": {"historyWindow": 6}}"#).unwrap();

        let loaded = load_settings_from_path(&path).unwrap();
        assert!(loaded.file_loaded);
        assert_eq!(loaded.path, path);

        let missing = load_settings_from_path(&dir.path().join("absent.json")).unwrap();
        assert!(!missing.file_loaded);
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_apply() {
        let mut settings = NexusSettings::default();
        let ignored = apply_overrides_with(
            &mut settings,
            lookup(&[
                ("NEXUS_PORT", "9100"),
                ("NEXUS_MODEL", "gemini-2.5-flash"),
                ("NEXUS_DEFAULT_MODULE", "Alchemist"),
                ("NEXUS_HISTORY_WINDOW", "25"),
                ("NEXUS_TEMPERATURE", "0.7"),
                ("GEMINI_API_KEY", "AIza-test"),
            ]),
        );
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.session.model_id, "gemini-2.5-flash");
        assert_eq!(settings.session.default_module, PersonaModule::Alchemist);
        assert_eq!(settings.session.history_window, 25);
        assert!((settings.session.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(settings.completion.api_key.unwrap().expose(), "AIza-test");
        assert!(ignored.is_empty());
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut settings = NexusSettings::default();
        let ignored = apply_overrides_with(
            &mut settings,
            lookup(&[
                ("NEXUS_PORT", "0"),
                ("NEXUS_DEFAULT_MODULE", "wizard"),
                ("NEXUS_HISTORY_WINDOW", "-3"),
                ("NEXUS_TEMPERATURE", "hot"),
            ]),
        );
        assert_eq!(settings.server.port, 8000);
        assert_eq!(settings.session.default_module, PersonaModule::Scholar);
        assert_eq!(settings.session.history_window, 10);

        let keys: Vec<&str> = ignored.iter().map(|i| i.key).collect();
        assert_eq!(
            keys,
            vec![
                "NEXUS_PORT",
                "NEXUS_DEFAULT_MODULE",
                "NEXUS_HISTORY_WINDOW",
                "NEXUS_TEMPERATURE"
            ]
        );
        assert_eq!(
            ignored[0],
            IgnoredOverride {
                key: "NEXUS_PORT",
                value: "0".into()
            }
        );
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let mut settings = NexusSettings::default();
        let ignored = apply_overrides_with(&mut settings, lookup(&[("GEMINI_API_KEY", "")]));
        assert!(settings.completion.api_key.is_none());
        assert!(ignored.is_empty());
    }

    // ── parsers ─────────────────────────────────────────────────────

    #[test]
    fn parse_u16_bounds() {
        assert_eq!(parse_u16_range("9090", 1, 65535), Some(9090));
        assert_eq!(parse_u16_range("0", 1, 65535), None);
        assert_eq!(parse_u16_range("99999", 1, 65535), None);
        assert_eq!(parse_u16_range("abc", 1, 65535), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 1000), Some(50));
        assert_eq!(parse_usize_range("0", 1, 1000), None);
        assert_eq!(parse_usize_range("2000", 1, 1000), None);
    }

    #[test]
    fn parse_f32_bounds() {
        assert_eq!(parse_f32_range("0.2", 0.0, 2.0), Some(0.2));
        assert_eq!(parse_f32_range("2.5", 0.0, 2.0), None);
        assert_eq!(parse_f32_range("warm", 0.0, 2.0), None);
    }
}

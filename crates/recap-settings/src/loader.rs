//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RecapSettings::default()`]
//! 2. If `~/.recap/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `RECAP_*` environment variable overrides (highest priority)
//! 4. Validate the result

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use recap_core::Tone;

use crate::errors::{Result, SettingsError};
use crate::types::RecapSettings;

/// Resolve the path to the settings file (`~/.recap/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".recap").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RecapSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RecapSettings> {
    let mut settings = merge_file(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn merge_file(path: &Path) -> Result<RecapSettings> {
    let parse_err = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let defaults = serde_json::to_value(RecapSettings::default()).map_err(parse_err)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_err)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse_err)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
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

/// Apply `RECAP_*` environment overrides. Values that fail to parse or fall
/// outside their range are logged and ignored.
pub fn apply_env_overrides(settings: &mut RecapSettings) {
    if let Some(v) = env_in_range("RECAP_BUFFER_CAPACITY", 1..=100_000) {
        settings.buffer.capacity = v;
    }
    if let Some(v) = env_parsed("RECAP_LINKING_ENABLED", parse_bool) {
        settings.linking.enabled = v;
    }
    if let Some(v) = env_in_range("RECAP_MAX_LINKS", 0..=100) {
        settings.linking.max_links = v;
    }

    if let Some(v) = env_in_range("RECAP_RETRY_MAX_ATTEMPTS", 1..=10) {
        settings.retry.max_attempts = v;
    }
    if let Some(v) = env_in_range("RECAP_RETRY_BASE_DELAY_MS", 0..=60_000) {
        settings.retry.base_delay_ms = v;
    }
    if let Some(v) = env_in_range("RECAP_RETRY_ATTEMPT_TIMEOUT_MS", 1000..=600_000) {
        settings.retry.attempt_timeout_ms = v;
    }

    if let Some(tone) = env_parsed("RECAP_DEFAULT_TONE", |v| v.parse::<Tone>().ok()) {
        settings.generation.default_tone = tone;
    }
    if let Some(v) = env_string("RECAP_MODEL") {
        settings.generation.model = v;
    }
    if let Some(v) = env_in_range("RECAP_DISPATCH_DEADLINE_MS", 100..=600_000) {
        settings.dispatch.deadline_ms = v;
    }

    if let Some(v) = env_string("RECAP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env_in_range("RECAP_PORT", 1..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env_string("RECAP_API_BASE_URL") {
        settings.api.base_url = v;
    }
    if let Some(v) = env_string("RECAP_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse `val` and keep it only if it lies within `range`.
pub fn parse_in_range<T>(val: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    val.trim().parse().ok().filter(|n| range.contains(n))
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parsed<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "ignoring invalid environment override");
    }
    parsed
}

fn env_in_range<T>(name: &str, range: RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    env_parsed(name, |raw| parse_in_range(raw, range))
}

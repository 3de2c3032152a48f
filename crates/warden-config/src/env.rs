//! `WARDEN_*` environment overrides.
//!
//! Overrides apply to scalar settings only and win over every file layer.
//! Agent rules can not be set from the environment.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};

/// Sets `logging.level`.
pub const LOG_LEVEL_VAR: &str = "WARDEN_LOG_LEVEL";

/// Sets every `approval.*_timeout_secs`.
pub const APPROVAL_TIMEOUT_VAR: &str = "WARDEN_APPROVAL_TIMEOUT_SECS";

/// Snapshot the process's `WARDEN_*` variables.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(key, _)| key.starts_with("WARDEN_"))
        .collect()
}

/// Apply overrides from `vars` to the merged tree. Returns how many applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a value does not parse.
pub fn apply_env_overrides(
    merged: &mut toml::Value,
    vars: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0usize;

    if let Some(level) = vars.get(LOG_LEVEL_VAR) {
        let level = level.trim();
        if level.is_empty() {
            return Err(ConfigError::EnvError {
                var_name: LOG_LEVEL_VAR.to_owned(),
                message: "must not be empty".to_owned(),
            });
        }
        set(merged, "logging", "level", toml::Value::String(level.to_owned()));
        applied = applied.saturating_add(1);
    }

    if let Some(raw) = vars.get(APPROVAL_TIMEOUT_VAR) {
        let secs: i64 = raw.trim().parse().map_err(|_| ConfigError::EnvError {
            var_name: APPROVAL_TIMEOUT_VAR.to_owned(),
            message: format!("'{raw}' is not a whole number of seconds"),
        })?;
        if secs < 0 {
            return Err(ConfigError::EnvError {
                var_name: APPROVAL_TIMEOUT_VAR.to_owned(),
                message: "must not be negative".to_owned(),
            });
        }
        for key in ["low_timeout_secs", "medium_timeout_secs", "high_timeout_secs"] {
            set(merged, "approval", key, toml::Value::Integer(secs));
        }
        applied = applied.saturating_add(1);
    }

    Ok(applied)
}

fn set(merged: &mut toml::Value, section: &str, key: &str, value: toml::Value) {
    let Some(root) = merged.as_table_mut() else {
        return;
    };
    let table = root
        .entry(section.to_owned())
        .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    if let Some(table) = table.as_table_mut() {
        table.insert(key.to_owned(), value);
    }
}

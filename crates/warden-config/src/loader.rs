//! Config file discovery and layered loading.
//!
//! 1. Parse the embedded `defaults.toml`
//! 2. Merge `~/.warden/config.toml` (user)
//! 3. Merge `{workspace}/.warden/config.toml` (workspace)
//! 4. Apply `WARDEN_*` environment overrides
//! 5. Deserialize, compiling every agent's patterns
//! 6. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_overrides, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::deep_merge;
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MiB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Name of the per-user and per-workspace config directory.
pub const WARDEN_DIR: &str = ".warden";

/// A loaded configuration and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged, validated configuration.
    pub config: Config,
    /// Files that contributed, lowest precedence first.
    pub loaded_files: Vec<PathBuf>,
    /// The user-level warden directory, e.g. `~/.warden`.
    pub warden_home: PathBuf,
}

impl LoadedConfig {
    /// The grant file, or `None` if persistence is off.
    #[must_use]
    pub fn grant_path(&self) -> Option<PathBuf> {
        self.config.grants.resolve_path(&self.warden_home)
    }
}

/// Load configuration with the full precedence chain, reading overrides from
/// the process environment.
///
/// `warden_home_override` replaces `~/.warden` as the user-level directory.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any layer is malformed or the merged result
/// fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    warden_home_override: Option<&Path>,
) -> ConfigResult<LoadedConfig> {
    load_with_env(workspace_root, warden_home_override, &collect_env_vars())
}

/// Like [`load`], with an explicit set of environment variables.
///
/// # Errors
///
/// Same as [`load`].
pub fn load_with_env(
    workspace_root: Option<&Path>,
    warden_home_override: Option<&Path>,
    env_vars: &HashMap<String, String>,
) -> ConfigResult<LoadedConfig> {
    let warden_home = match warden_home_override {
        Some(h) => h.to_path_buf(),
        None => home_directory()?.join(WARDEN_DIR),
    };

    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut loaded_files = Vec::new();

    let user_path = warden_home.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        deep_merge(&mut merged, &overlay);
        info!(path = %user_path.display(), "loaded user config");
        loaded_files.push(user_path);
    }

    if let Some(ws_root) = workspace_root {
        let ws_path = ws_root.join(WARDEN_DIR).join("config.toml");
        if let Some(overlay) = try_load_file(&ws_path)? {
            deep_merge(&mut merged, &overlay);
            info!(path = %ws_path.display(), "loaded workspace config");
            loaded_files.push(ws_path);
        }
    }

    let overrides = apply_env_overrides(&mut merged, env_vars)?;
    if overrides > 0 {
        debug!(count = overrides, "applied environment overrides");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;
    validate::validate(&config)?;

    debug!(
        agents = config.agents.len(),
        files = loaded_files.len(),
        "configuration loaded"
    );
    Ok(LoadedConfig {
        config,
        loaded_files,
        warden_home,
    })
}

/// Load a single file on top of the built-in defaults, with no layering
/// or environment overrides.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file is missing, too large, malformed
/// or invalid.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let Some(value) = try_load_file(path)? else {
        return Err(ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    };
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Read and parse a file, returning `None` if it does not exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {size} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit"
            ),
        });
    }

    toml::from_str(&content)
        .map(Some)
        .map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })
}

fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{APPROVAL_TIMEOUT_VAR, LOG_LEVEL_VAR};
    use std::time::Duration;
    use warden_core::{Decision, GrantScope};

    fn write(dir: &Path, body: &str) -> PathBuf {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_without_files() {
        let home = tempfile::tempdir().unwrap();
        let loaded = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap();
        assert!(loaded.loaded_files.is_empty());
        assert_eq!(loaded.config, Config::default());
        assert_eq!(loaded.grant_path(), Some(home.path().join("grants.json")));
    }

    #[test]
    fn test_layer_precedence() {
        let home = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        write(
            home.path(),
            r#"
            [approval]
            low_timeout_secs = 10
            medium_timeout_secs = 20

            [agents.coder.bash]
            allow_patterns = ["git *"]
            default = "ask"

            [agents.coder.files.read]
            default = "allow"
            "#,
        );
        write(
            &workspace.path().join(WARDEN_DIR),
            r#"
            [approval]
            medium_timeout_secs = 5
            default_scope = "session"

            [agents.coder.bash]
            allow_patterns = ["cargo *"]
            "#,
        );

        let loaded =
            load_with_env(Some(workspace.path()), Some(home.path()), &HashMap::new()).unwrap();
        let config = &loaded.config;
        assert_eq!(loaded.loaded_files.len(), 2);
        assert_eq!(config.approval.low_timeout(), Duration::from_secs(10));
        assert_eq!(config.approval.medium_timeout(), Duration::from_secs(5));
        assert_eq!(config.approval.high_timeout(), Duration::from_secs(600));
        assert_eq!(config.approval.default_scope, GrantScope::Session);

        let coder = &config.agents["coder"];
        assert_eq!(coder.bash.rules().allow_patterns(), ["cargo *".to_owned()]);
        assert_eq!(coder.bash.evaluate("cargo build").decision, Decision::Allow);
        assert_eq!(coder.bash.evaluate("git status").decision, Decision::Ask);
        assert_eq!(
            coder.files.read.evaluate("src/lib.rs").decision,
            Decision::Allow
        );
    }

    #[test]
    fn test_env_overrides_win() {
        let home = tempfile::tempdir().unwrap();
        write(home.path(), "[logging]\nlevel = \"warn\"\n");
        let env = HashMap::from([
            (LOG_LEVEL_VAR.to_owned(), "trace".to_owned()),
            (APPROVAL_TIMEOUT_VAR.to_owned(), "0".to_owned()),
        ]);
        let loaded = load_with_env(None, Some(home.path()), &env).unwrap();
        assert_eq!(loaded.config.logging.level, "trace");
        assert_eq!(loaded.config.approval.high_timeout(), Duration::ZERO);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let home = tempfile::tempdir().unwrap();
        write(
            home.path(),
            "[agents.coder.files.write]\nallow_patterns = [\"src/[\"]\n",
        );
        let err = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_malformed_toml_names_file() {
        let home = tempfile::tempdir().unwrap();
        let path = write(home.path(), "[approval\n");
        let err = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap_err();
        match err {
            ConfigError::ParseError { path: p, .. } => assert_eq!(p, path.display().to_string()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_file_rejected() {
        let home = tempfile::tempdir().unwrap();
        let padding = "#".repeat(1_048_577);
        write(home.path(), &padding);
        let err = load_with_env(None, Some(home.path()), &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "[agents.reviewer.files.edit]\ndocumentation_only = true\ndefault = \"allow\"\n",
        );
        let config = load_file(&path).unwrap();
        let reviewer = &config.agents["reviewer"];
        assert_eq!(
            reviewer.files.edit.evaluate("README.md").decision,
            Decision::Allow
        );
        assert_eq!(
            reviewer.files.edit.evaluate("main.rs").decision,
            Decision::Deny
        );

        assert!(matches!(
            load_file(&dir.path().join("missing.toml")),
            Err(ConfigError::ReadError { .. })
        ));
    }
}

//! Bridge from `warden_config::Config` to domain types.
//!
//! The config crate only loads and validates. Everything the engine needs at
//! runtime is built here, once, from the merged configuration.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use warden_approval::{
    ApprovalBroker, ApprovalTimeouts, GrantStore, JsonGrantFile, PermissionManager,
};
use warden_config::{Config, LoadedConfig};
use warden_core::{AgentId, PermissionResult};
use warden_policy::{AgentRuntimeSpec, DeclarationError, DeclarationRegistry};
use warden_telemetry::{LogConfig, LogFormat};

/// Convert the `[approval]` section to [`ApprovalTimeouts`].
#[must_use]
pub fn to_timeouts(cfg: &Config) -> ApprovalTimeouts {
    ApprovalTimeouts {
        low: cfg.approval.low_timeout(),
        medium: cfg.approval.medium_timeout(),
        high: cfg.approval.high_timeout(),
    }
}

/// Convert the `[logging]` section to [`LogConfig`].
#[must_use]
pub fn to_log_config(cfg: &Config) -> LogConfig {
    let format = match cfg.logging.format.as_str() {
        "json" => LogFormat::Json,
        "compact" => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    let mut log_config = LogConfig::new(&cfg.logging.level).with_format(format);

    if let Some(dir) = &cfg.logging.directory {
        log_config = log_config.with_file_logging(dir);
    }
    for directive in &cfg.logging.directives {
        log_config = log_config.with_directive(directive);
    }

    log_config
}

/// Agent specs keyed by [`AgentId`].
#[must_use]
pub fn to_specs(cfg: &Config) -> HashMap<AgentId, AgentRuntimeSpec> {
    cfg.agents
        .iter()
        .map(|(name, spec)| (AgentId::from(name.as_str()), spec.clone()))
        .collect()
}

/// Register every `[tools]` declaration, returning the registry and the tools
/// that were excluded.
#[must_use]
pub fn to_declarations(cfg: &Config) -> (DeclarationRegistry, Vec<(String, DeclarationError)>) {
    let mut registry = DeclarationRegistry::new();
    let excluded = cfg
        .tools
        .iter()
        .filter_map(|(name, set)| {
            registry
                .register_set(name, set.clone())
                .err()
                .map(|e| (name.clone(), e))
        })
        .collect();
    (registry, excluded)
}

/// Open the grant store, backed by the configured file when persistence is on.
///
/// # Errors
///
/// Returns an error if the grant file exists but cannot be read.
pub fn to_grant_store(loaded: &LoadedConfig) -> PermissionResult<GrantStore> {
    match loaded.grant_path() {
        Some(path) => GrantStore::with_persistence(Arc::new(JsonGrantFile::new(path))),
        None => Ok(GrantStore::new()),
    }
}

/// Build a manager for `workspace_root` with every agent and tool installed.
///
/// Excluded tools are returned so the caller can report them.
///
/// # Errors
///
/// Returns an error if the grant store cannot be opened.
pub fn to_manager(
    loaded: &LoadedConfig,
    workspace_root: &Path,
) -> PermissionResult<(PermissionManager, Vec<(String, DeclarationError)>)> {
    let cfg = &loaded.config;
    let broker = Arc::new(ApprovalBroker::new(Arc::new(to_grant_store(loaded)?)));
    let (registry, excluded) = to_declarations(cfg);

    let manager = PermissionManager::new(workspace_root, broker)
        .with_declarations(Arc::new(registry))
        .with_timeouts(to_timeouts(cfg))
        .with_default_scope(cfg.approval.default_scope);
    manager.replace_specs(to_specs(cfg));

    Ok((manager, excluded))
}

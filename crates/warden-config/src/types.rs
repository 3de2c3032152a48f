//! Configuration struct definitions.
//!
//! Every section defaults to the values in `defaults.toml`, so a file only
//! needs to name what it changes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use warden_core::GrantScope;
use warden_policy::{AgentRuntimeSpec, ToolPermissionSet};

/// The merged Warden configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Approval timeouts and default scope.
    pub approval: ApprovalSection,
    /// Grant persistence.
    pub grants: GrantSection,
    /// Logging.
    pub logging: LoggingSection,
    /// Per-agent permission specs, keyed by agent id.
    pub agents: BTreeMap<String, AgentRuntimeSpec>,
    /// Tool permission declarations, keyed by tool name. Checked when
    /// registered; invalid entries are excluded rather than rejected here.
    pub tools: BTreeMap<String, ToolPermissionSet>,
}

/// `[approval]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApprovalSection {
    /// Timeout for low-risk requests, in seconds.
    pub low_timeout_secs: u64,
    /// Timeout for medium-risk requests, in seconds.
    pub medium_timeout_secs: u64,
    /// Timeout for high-risk requests, in seconds.
    pub high_timeout_secs: u64,
    /// Scope requested when a call does not ask for one.
    pub default_scope: GrantScope,
}

impl Default for ApprovalSection {
    fn default() -> Self {
        Self {
            low_timeout_secs: 120,
            medium_timeout_secs: 300,
            high_timeout_secs: 600,
            default_scope: GrantScope::OneTime,
        }
    }
}

impl ApprovalSection {
    /// Low-risk timeout.
    #[must_use]
    pub fn low_timeout(&self) -> Duration {
        Duration::from_secs(self.low_timeout_secs)
    }

    /// Medium-risk timeout.
    #[must_use]
    pub fn medium_timeout(&self) -> Duration {
        Duration::from_secs(self.medium_timeout_secs)
    }

    /// High-risk timeout.
    #[must_use]
    pub fn high_timeout(&self) -> Duration {
        Duration::from_secs(self.high_timeout_secs)
    }
}

/// `[grants]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrantSection {
    /// Mirror persistent grants to disk.
    pub persist: bool,
    /// Grant file. Relative paths resolve against the warden home directory.
    pub path: PathBuf,
}

impl Default for GrantSection {
    fn default() -> Self {
        Self {
            persist: true,
            path: PathBuf::from("grants.json"),
        }
    }
}

impl GrantSection {
    /// The grant file, or `None` if persistence is off.
    #[must_use]
    pub fn resolve_path(&self, warden_home: &Path) -> Option<PathBuf> {
        if !self.persist {
            return None;
        }
        if self.path.is_absolute() {
            Some(self.path.clone())
        } else {
            Some(warden_home.join(&self.path))
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    /// Base level filter.
    pub level: String,
    /// `pretty`, `compact` or `json`.
    pub format: String,
    /// Write daily-rolling files here instead of stderr.
    pub directory: Option<PathBuf>,
    /// Extra filter directives.
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            format: "pretty".to_owned(),
            directory: None,
            directives: Vec::new(),
        }
    }
}

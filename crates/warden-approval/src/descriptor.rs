//! What an approval request is about.

use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::AccessKind;

/// The family of resource being accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "access")]
pub enum ResourceKind {
    /// A file path.
    File(AccessKind),
    /// A command line.
    Command,
    /// Anything a tool escalates explicitly.
    Custom,
}

/// Identifies the action an approval or grant covers.
///
/// Together with the agent id, `(action, resource)` is the grant key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermissionDescriptor {
    /// Resource family.
    pub kind: ResourceKind,
    /// Canonical action string, e.g. `file.write`.
    pub action: String,
    /// Normalized resource.
    pub resource: String,
    /// Whether the declaring tool or rule demanded a human decision.
    pub requires_hitl: bool,
}

impl PermissionDescriptor {
    /// A file access on a normalized path.
    #[must_use]
    pub fn file(kind: AccessKind, resource: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::File(kind),
            action: format!("file.{kind}"),
            resource: resource.into(),
            requires_hitl: false,
        }
    }

    /// Execution of a space-joined command line.
    #[must_use]
    pub fn command(command_line: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Command,
            action: "command.execute".to_owned(),
            resource: command_line.into(),
            requires_hitl: false,
        }
    }

    /// A tool-defined action.
    #[must_use]
    pub fn custom(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::Custom,
            action: action.into(),
            resource: resource.into(),
            requires_hitl: true,
        }
    }

    /// Mark the request as requiring a human decision.
    #[must_use]
    pub fn with_hitl(mut self, requires_hitl: bool) -> Self {
        self.requires_hitl = requires_hitl;
        self
    }
}

impl fmt::Display for PermissionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.resource)
    }
}

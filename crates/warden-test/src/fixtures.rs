//! Test fixtures for common types.

use warden_approval::PermissionDescriptor;
use warden_core::{AccessKind, AgentId, Decision};
use warden_policy::{
    AgentRuntimeSpec, BashRule, FilePermissionRule, FileRules, ToolPermissionSet, ToolPermissions,
};

/// Create a test agent ID.
#[must_use]
pub fn test_agent_id() -> AgentId {
    AgentId::from("test-agent")
}

/// Files rule set: read anything, write only below `src/` except
/// `src/secrets/`, edits escalate.
///
/// # Panics
///
/// Panics if the built-in patterns fail to compile.
#[must_use]
pub fn write_spec() -> AgentRuntimeSpec {
    AgentRuntimeSpec {
        files: FileRules {
            read: FilePermissionRule::with_default(Decision::Allow),
            write: FilePermissionRule::new(["src/**"], ["src/secrets/**"], Decision::Deny)
                .expect("constant patterns compile"),
            edit: FilePermissionRule::with_default(Decision::Ask),
        },
        bash: BashRule::with_default(Decision::Deny),
    }
}

/// Bash rule set: `git` is allowed, pushing is denied, anything else asks.
///
/// # Panics
///
/// Panics if the built-in patterns fail to compile.
#[must_use]
pub fn bash_spec() -> AgentRuntimeSpec {
    AgentRuntimeSpec {
        bash: BashRule::new(["git *"], ["git push*"], Decision::Ask)
            .expect("constant patterns compile"),
        ..AgentRuntimeSpec::default()
    }
}

/// [`write_spec`] files combined with [`bash_spec`] commands.
#[must_use]
pub fn scenario_spec() -> AgentRuntimeSpec {
    AgentRuntimeSpec {
        files: write_spec().files,
        bash: bash_spec().bash,
    }
}

/// A command descriptor for `rm -rf /tmp/x`.
#[must_use]
pub fn test_command_descriptor() -> PermissionDescriptor {
    PermissionDescriptor::command("rm -rf /tmp/x")
}

/// A file-write descriptor.
#[must_use]
pub fn test_write_descriptor(path: &str) -> PermissionDescriptor {
    PermissionDescriptor::file(AccessKind::Write, path)
}

/// A tool with a fixed declaration.
#[derive(Debug, Clone)]
pub struct StaticTool {
    name: String,
    permissions: ToolPermissionSet,
}

impl StaticTool {
    /// Declare a tool named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, permissions: ToolPermissionSet) -> Self {
        Self {
            name: name.into(),
            permissions,
        }
    }
}

impl ToolPermissions for StaticTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn permissions(&self) -> ToolPermissionSet {
        self.permissions.clone()
    }
}

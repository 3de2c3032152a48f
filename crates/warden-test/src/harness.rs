//! Test harness helpers.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use warden_approval::{
    ApprovalBroker, ApprovalTimeouts, GrantStore, JsonGrantFile, PermissionManager,
};
use warden_core::AgentId;
use warden_policy::{AgentRuntimeSpec, DeclarationRegistry, ToolPermissionSet};

use crate::mocks::MockApprovalSink;

/// Set up test logging with the given filter.
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// A manager wired to a broker and grant store over a temporary workspace.
#[derive(Debug)]
pub struct TestHarness {
    /// Temporary directory. The workspace root is `dir/workspace`.
    pub dir: TempDir,
    /// The broker behind the manager.
    pub broker: Arc<ApprovalBroker>,
    /// The manager under test.
    pub manager: PermissionManager,
    registry: DeclarationRegistry,
    persistent: bool,
}

impl TestHarness {
    /// A harness with an in-memory grant store.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self::build(temp_dir(), false, DeclarationRegistry::new())
    }

    /// A harness whose persistent grants are kept in `dir/grants.json`.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn persistent() -> Self {
        Self::build(temp_dir(), true, DeclarationRegistry::new())
    }

    /// Rebuild broker, store and manager over the same directory, as after
    /// a process restart. Specs and sinks must be installed again.
    #[must_use]
    pub fn restart(self) -> Self {
        Self::build(self.dir, self.persistent, self.registry)
    }

    fn build(dir: TempDir, persistent: bool, registry: DeclarationRegistry) -> Self {
        let workspace = dir.path().join("workspace");
        std::fs::create_dir_all(&workspace).expect("Failed to create workspace");

        let grants = if persistent {
            GrantStore::with_persistence(Arc::new(JsonGrantFile::new(
                dir.path().join("grants.json"),
            )))
            .expect("Failed to load grant file")
        } else {
            GrantStore::new()
        };
        let broker = Arc::new(ApprovalBroker::new(Arc::new(grants)));
        let manager = PermissionManager::new(workspace, Arc::clone(&broker))
            .with_declarations(Arc::new(registry.clone()));

        Self {
            dir,
            broker,
            manager,
            registry,
            persistent,
        }
    }

    /// Install a spec for `agent`.
    #[must_use]
    pub fn with_spec(self, agent: &AgentId, spec: AgentRuntimeSpec) -> Self {
        self.manager.install_spec(agent.clone(), spec);
        self
    }

    /// Register a tool declaration.
    ///
    /// # Panics
    ///
    /// Panics if the declaration is invalid.
    #[must_use]
    pub fn with_tool(mut self, name: &str, set: ToolPermissionSet) -> Self {
        self.registry
            .register_set(name, set)
            .expect("Invalid tool declaration");
        self.manager = self
            .manager
            .with_declarations(Arc::new(self.registry.clone()));
        self
    }

    /// Override approval timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ApprovalTimeouts) -> Self {
        self.manager = self.manager.with_timeouts(timeouts);
        self
    }

    /// Register `sink` with the broker.
    pub fn attach(&self, sink: MockApprovalSink) -> Arc<MockApprovalSink> {
        sink.install(&self.broker)
    }

    /// The workspace root.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        self.manager.workspace_root()
    }

    /// Where persistent grants are written.
    #[must_use]
    pub fn grant_file(&self) -> PathBuf {
        self.dir.path().join("grants.json")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

fn temp_dir() -> TempDir {
    TempDir::with_prefix("warden-").expect("Failed to create temp directory")
}

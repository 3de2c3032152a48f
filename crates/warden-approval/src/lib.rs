//! Warden Approval - Grants, human-in-the-loop escalation and the permission
//! manager.
//!
//! This crate is the asynchronous half of the permission engine:
//!
//! - [`GrantStore`] remembers approvals per `(agent, action, resource)`,
//!   optionally mirroring persistent grants to disk
//! - [`ApprovalBroker`] turns an `Ask` into a pending request, publishes it
//!   through an [`ApprovalSink`] and suspends callers until a human resolves
//!   it, the deadline passes or the caller gives up
//! - [`PermissionManager`] is the single entry point tools call: it checks
//!   tool bounds, evaluates the agent's rules and escalates when asked to
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use warden_approval::{AccessProof, ApprovalBroker, CallContext, GrantStore, PermissionManager};
//! use warden_core::{AccessKind, AgentId, Decision};
//! use warden_policy::{AgentRuntimeSpec, FilePermissionRule};
//!
//! # tokio_test_block_on(async {
//! let broker = Arc::new(ApprovalBroker::new(Arc::new(GrantStore::new())));
//! let manager = PermissionManager::new("/work", broker);
//!
//! let mut spec = AgentRuntimeSpec::default();
//! spec.files.read = FilePermissionRule::with_default(Decision::Allow);
//! manager.install_spec(AgentId::from("coder"), spec);
//!
//! let ctx = CallContext::new(CancellationToken::new());
//! let proof = manager
//!     .check_file_access(&ctx, &AgentId::from("coder"), AccessKind::Read, "src/lib.rs")
//!     .await
//!     .unwrap();
//! assert_eq!(proof, AccessProof::Policy { pattern: None });
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod broker;
pub mod descriptor;
pub mod grant;
pub mod manager;

pub use broker::{
    ApprovalBroker, ApprovalOutcome, ApprovalSink, ApprovalState, PendingApproval, Resolution,
};
pub use descriptor::{PermissionDescriptor, ResourceKind};
pub use grant::{
    Grant, GrantKey, GrantPersistence, GrantStore, JsonGrantFile, NoPersistence,
};
pub use manager::{AccessProof, ApprovalTimeouts, CallContext, PermissionManager};

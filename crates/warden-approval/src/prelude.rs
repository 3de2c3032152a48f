//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_approval::prelude::*;` to import all essential types.

// Manager
pub use crate::{AccessProof, ApprovalTimeouts, CallContext, PermissionManager};

// Broker
pub use crate::{ApprovalBroker, ApprovalOutcome, ApprovalSink, PendingApproval, Resolution};

// Grants
pub use crate::{Grant, GrantPersistence, GrantStore, JsonGrantFile};

// Descriptors
pub use crate::PermissionDescriptor;

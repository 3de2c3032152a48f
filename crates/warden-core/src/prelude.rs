//! Prelude module - commonly used types for convenient import.
//!
//! Use `use warden_core::prelude::*;` to import all essential types.

// Errors
pub use crate::{ErrorKind, PermissionError, PermissionResult};

// Enums
pub use crate::{AccessKind, Decision, GrantScope, RiskLevel};

// Identifiers
pub use crate::{AgentId, ApprovalId, GrantId, Timestamp};

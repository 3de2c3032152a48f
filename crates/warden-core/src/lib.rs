//! Warden Core - Shared types for the Warden permission engine.
//!
//! This crate holds the vocabulary every other Warden crate speaks:
//!
//! - Closed enums: [`AccessKind`], [`Decision`], [`GrantScope`], [`RiskLevel`]
//! - Identifiers: [`AgentId`], [`ApprovalId`], [`GrantId`], plus [`Timestamp`]
//! - The error taxonomy: [`PermissionError`] classified by [`ErrorKind`]
//!
//! # Example
//!
//! ```
//! use warden_core::{AccessKind, Decision, RiskLevel};
//!
//! assert_eq!(AccessKind::Write.risk(), RiskLevel::Medium);
//! assert_eq!(Decision::Allow.force_ask(), Decision::Ask);
//! assert_eq!(Decision::Deny.force_ask(), Decision::Deny);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

pub mod error;
pub mod types;

pub use error::{ErrorKind, PermissionError, PermissionResult};
pub use types::{
    AccessKind, AgentId, ApprovalId, Decision, GrantId, GrantScope, RiskLevel, Timestamp,
};

//! Warden Policy - Pattern rules, decisions and tool declarations.
//!
//! This crate is the synchronous half of the permission engine. It never
//! blocks and never talks to a human:
//!
//! - [`PatternSet`] compiles glob lists and answers "does anything match"
//! - [`decide_by_patterns`] and [`PatternRuleSet`] turn matches into
//!   [`Decision`](warden_core::Decision)s with deny-wins precedence
//! - [`AgentRuntimeSpec`] holds an agent's file and bash rules
//! - [`ToolPermissionSet`] and [`DeclarationRegistry`] hold what each tool
//!   declared it needs
//!
//! # Example
//!
//! ```
//! use warden_core::Decision;
//! use warden_policy::{MatchMode, PatternRuleSet};
//!
//! let bash = PatternRuleSet::new(MatchMode::Command, ["git *"], ["git push*"], Decision::Ask)
//!     .unwrap();
//! assert_eq!(bash.decide("git push origin main").decision, Decision::Deny);
//! assert_eq!(bash.decide("git status").decision, Decision::Allow);
//! assert_eq!(bash.decide("rm -rf /").decision, Decision::Ask);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod decision;
pub mod declaration;
pub mod normalize;
pub mod pattern;
pub mod spec;

pub use decision::{PatternRuleSet, Verdict, VerdictSource, decide_by_patterns};
pub use declaration::{
    DeclarationError, DeclarationRegistry, ExecutablePermission, FileSystemPermission,
    ToolPermissionSet, ToolPermissions,
};
pub use normalize::{command_line, normalize_path};
pub use pattern::{MatchMode, PatternError, PatternSet, matches_any};
pub use spec::{AgentRuntimeSpec, BashRule, FilePermissionRule, FileRules, RuleRef};

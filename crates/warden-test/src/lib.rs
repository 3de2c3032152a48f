//! Warden Test - Shared test utilities for the Warden permission engine.
//!
//! Mock approval surfaces, spec fixtures and a ready-wired manager harness,
//! for use as a dev-dependency.
//!
//! ```rust,ignore
//! use warden_approval::Resolution;
//! use warden_test::{MockApprovalSink, TestHarness};
//!
//! #[tokio::test]
//! async fn test_write_is_approved() {
//!     let sink = MockApprovalSink::new().with_resolution(Resolution::approve());
//!     let harness = TestHarness::new().with_sink(sink);
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;

//! Warden Telemetry - Logging for the Warden permission engine.
//!
//! Every decision, escalation and resolution in Warden is emitted as a
//! structured `tracing` event. This crate installs the subscriber that
//! renders them: pretty or compact for terminals, JSON for audit pipelines,
//! optionally to daily-rolling files.
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), warden_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("warden_approval=debug");
//! setup_logging(&config)?;
//!
//! tracing::info!(agent = "coder", "ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging,
};

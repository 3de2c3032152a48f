//! Layered configuration for the Warden permission engine.
//!
//! # Configuration Precedence
//!
//! From highest to lowest priority:
//!
//! 1. **Environment variables** (`WARDEN_LOG_LEVEL`, `WARDEN_APPROVAL_TIMEOUT_SECS`)
//! 2. **Workspace** (`{workspace}/.warden/config.toml`)
//! 3. **User** (`~/.warden/config.toml`)
//! 4. **Embedded defaults** (`defaults.toml` compiled into the binary)
//!
//! Tables merge key by key; scalars and arrays replace. Agent rules are
//! compiled while deserializing, so a bad glob is reported at load time.
//!
//! # Usage
//!
//! ```rust,no_run
//! let loaded = warden_config::load(Some(std::path::Path::new(".")), None).unwrap();
//! for agent in loaded.config.agents.keys() {
//!     println!("{agent}");
//! }
//! ```
//!
//! Conversion into runtime types (timeouts, log setup, grant storage)
//! happens at the binary's startup boundary.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// `WARDEN_*` environment overrides.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file discovery and loading.
pub mod loader;
/// Layer merging.
pub mod merge;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{LoadedConfig, WARDEN_DIR, load, load_file, load_with_env};
pub use types::{ApprovalSection, Config, GrantSection, LoggingSection};

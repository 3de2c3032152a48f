//! Configuration error types.

use std::io;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config file exists but could not be read.
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// Path to the file.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// A config file is not valid TOML, or does not match the schema.
    #[error("Failed to parse config file at {path}: {source}")]
    ParseError {
        /// Path to the file, or a `<...>` marker for merged and embedded input.
        path: String,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range after merging.
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// An environment override could not be applied.
    #[error("Environment variable '{var_name}': {message}")]
    EnvError {
        /// The variable.
        var_name: String,
        /// What is wrong with it.
        message: String,
    },

    /// No home directory to look for user config in.
    #[error("Could not determine home directory")]
    NoHomeDir,
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

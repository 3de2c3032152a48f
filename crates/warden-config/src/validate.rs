//! Post-merge configuration validation.
//!
//! Pattern syntax is already checked when agent rules deserialize; this
//! module covers ranges and names.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Config;

/// Longest approval timeout accepted (24 hours).
const MAX_TIMEOUT_SECS: u64 = 86_400;

const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Validate a merged configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_approval(config)?;
    validate_logging(config)?;
    validate_agents(config)?;
    Ok(())
}

fn validate_approval(config: &Config) -> ConfigResult<()> {
    let a = &config.approval;
    for (field, secs) in [
        ("approval.low_timeout_secs", a.low_timeout_secs),
        ("approval.medium_timeout_secs", a.medium_timeout_secs),
        ("approval.high_timeout_secs", a.high_timeout_secs),
    ] {
        if secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::ValidationError {
                field: field.to_owned(),
                message: format!(
                    "{secs} seconds exceeds the {MAX_TIMEOUT_SECS} second limit; use 0 to wait indefinitely"
                ),
            });
        }
    }
    Ok(())
}

fn validate_logging(config: &Config) -> ConfigResult<()> {
    let l = &config.logging;
    if l.level.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "logging.level".to_owned(),
            message: "level must not be empty".to_owned(),
        });
    }
    if !LOG_FORMATS.contains(&l.format.as_str()) {
        return Err(ConfigError::ValidationError {
            field: "logging.format".to_owned(),
            message: format!(
                "unsupported format '{}'; expected one of: {}",
                l.format,
                LOG_FORMATS.join(", ")
            ),
        });
    }
    if let Some(i) = l.directives.iter().position(|d| d.trim().is_empty()) {
        return Err(ConfigError::ValidationError {
            field: format!("logging.directives[{i}]"),
            message: "directive must not be empty".to_owned(),
        });
    }
    Ok(())
}

fn validate_agents(config: &Config) -> ConfigResult<()> {
    for name in config.agents.keys() {
        if name.trim().is_empty() || name.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationError {
                field: format!("agents.{name:?}"),
                message: "agent ids must be non-empty and contain no whitespace".to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_policy::AgentRuntimeSpec;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout_allowed() {
        let mut config = Config::default();
        config.approval.high_timeout_secs = 0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_huge_timeout_rejected() {
        let mut config = Config::default();
        config.approval.medium_timeout_secs = MAX_TIMEOUT_SECS.saturating_add(1);
        let err = validate(&config).unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { ref field, .. } if field == "approval.medium_timeout_secs")
        );
    }

    #[test]
    fn test_bad_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_owned();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_agent_names() {
        let mut config = Config::default();
        config
            .agents
            .insert("coder".to_owned(), AgentRuntimeSpec::default());
        assert!(validate(&config).is_ok());

        config
            .agents
            .insert("bad name".to_owned(), AgentRuntimeSpec::default());
        assert!(validate(&config).is_err());
    }
}

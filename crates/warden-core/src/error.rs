//! Error taxonomy for permission checks and approvals.

use thiserror::Error;

/// Coarse classification of a [`PermissionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Misconfiguration or a request that can never succeed as issued.
    Structural,
    /// Policy or a human refused the action.
    Denied,
    /// Nobody answered the approval request in time.
    Timeout,
    /// The caller gave up waiting.
    Cancelled,
    /// A collaborator (sink, storage, filesystem) failed.
    Transport,
}

/// Errors returned by permission checks and the approval workflow.
#[derive(Debug, Error)]
pub enum PermissionError {
    /// A tool declared an invalid permission set.
    #[error("invalid permission declaration for tool {tool}: {reason}")]
    InvalidDeclaration {
        /// Tool name.
        tool: String,
        /// Validation failure.
        reason: String,
    },

    /// The named tool has no registered declaration.
    #[error("tool {tool} has no registered permission declaration")]
    UnknownTool {
        /// Tool name.
        tool: String,
    },

    /// No runtime spec is installed for the agent.
    #[error("no runtime spec installed for agent {agent}")]
    UnknownAgent {
        /// Agent id.
        agent: String,
    },

    /// The resource lies outside the bounds a tool declared.
    #[error("{resource} is outside the {action} bounds declared by tool {tool}")]
    OutOfBounds {
        /// Tool name.
        tool: String,
        /// Canonical action string.
        action: String,
        /// Normalized resource.
        resource: String,
    },

    /// An executable check was issued without a command.
    #[error("empty command")]
    EmptyCommand,

    /// A glob pattern failed to compile.
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// An approval was required but no approval surface is registered.
    #[error("no approval surface registered for {action} on {resource}")]
    NoApprovalSurface {
        /// Canonical action string.
        action: String,
        /// Normalized resource.
        resource: String,
    },

    /// A resolution referenced an unknown or already-finished approval.
    #[error("unknown or already resolved approval {id}")]
    UnknownApproval {
        /// The approval id as displayed.
        id: String,
    },

    /// The action was refused by policy or by a human.
    #[error("{action} on {resource} denied{}: {reason}", rule.as_ref().map(|r| format!(" by rule '{r}'")).unwrap_or_default())]
    Denied {
        /// Canonical action string.
        action: String,
        /// Normalized resource.
        resource: String,
        /// The rule or pattern that produced the denial, if any.
        rule: Option<String>,
        /// Human-readable reason.
        reason: String,
    },

    /// The approval request expired before anyone answered.
    #[error("timed out waiting for approval of {action} on {resource} after {timeout_ms}ms")]
    ApprovalTimeout {
        /// Canonical action string.
        action: String,
        /// Normalized resource.
        resource: String,
        /// Time awaited before timeout, in milliseconds.
        timeout_ms: u64,
    },

    /// The caller cancelled while waiting for approval.
    #[error("approval of {action} on {resource} was cancelled")]
    ApprovalCancelled {
        /// Canonical action string.
        action: String,
        /// Normalized resource.
        resource: String,
    },

    /// The approval surface failed to accept a request.
    #[error("approval surface error: {0}")]
    Sink(String),

    /// Grant persistence failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PermissionError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDeclaration { .. }
            | Self::UnknownTool { .. }
            | Self::UnknownAgent { .. }
            | Self::OutOfBounds { .. }
            | Self::EmptyCommand
            | Self::InvalidPattern { .. }
            | Self::NoApprovalSurface { .. }
            | Self::UnknownApproval { .. } => ErrorKind::Structural,
            Self::Denied { .. } => ErrorKind::Denied,
            Self::ApprovalTimeout { .. } => ErrorKind::Timeout,
            Self::ApprovalCancelled { .. } => ErrorKind::Cancelled,
            Self::Sink(_) | Self::Storage(_) | Self::Io(_) => ErrorKind::Transport,
        }
    }

    /// Whether the action was refused.
    #[must_use]
    pub fn is_denied(&self) -> bool {
        self.kind() == ErrorKind::Denied
    }

    /// Whether re-issuing the same request might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Timeout | ErrorKind::Cancelled)
    }
}

/// Result type for permission operations.
pub type PermissionResult<T> = Result<T, PermissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_denied_display_names_rule() {
        let err = PermissionError::Denied {
            action: "file.write".to_string(),
            resource: "src/secrets/key.go".to_string(),
            rule: Some("src/secrets/**".to_string()),
            reason: "matched deny pattern".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("src/secrets/**"));
        assert!(msg.contains("file.write"));
        assert!(err.is_denied());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_denied_display_without_rule() {
        let err = PermissionError::Denied {
            action: "command.execute".to_string(),
            resource: "rm -rf /".to_string(),
            rule: None,
            reason: "denied by user".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command.execute on rm -rf / denied: denied by user"
        );
    }

    #[test]
    fn test_timeout_display_and_kind() {
        let err = PermissionError::ApprovalTimeout {
            action: "file.write".to_string(),
            resource: "a.txt".to_string(),
            timeout_ms: 50,
        };
        assert!(err.to_string().contains("timed out waiting for approval"));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(PermissionError::EmptyCommand.kind(), ErrorKind::Structural);
        assert_eq!(
            PermissionError::Storage("disk full".into()).kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            PermissionError::ApprovalCancelled {
                action: "exec".into(),
                resource: "ls".into()
            }
            .kind(),
            ErrorKind::Cancelled
        );
    }
}

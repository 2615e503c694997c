//! Error types for the vigil-alerts crate.

use thiserror::Error;

/// Errors that can occur in the alerting pipeline.
#[derive(Debug, Error)]
pub enum AlertError {
    /// Invalid alert rule configuration.
    #[error("invalid alert rule: {reason}")]
    InvalidRule {
        /// The reason the rule is invalid.
        reason: String,
    },

    /// Alert rule with the given name was not found.
    #[error("rule not found: {name}")]
    RuleNotFound {
        /// The rule name that was not found.
        name: String,
    },

    /// Alert with the given ID was not found.
    #[error("alert not found: {id}")]
    AlertNotFound {
        /// The alert ID that was not found.
        id: String,
    },

    /// A rule condition could not be parsed.
    #[error("parse error at position {position}: {reason}")]
    ParseError {
        /// Byte offset into the condition source.
        position: usize,
        /// What was wrong.
        reason: String,
    },

    /// Failed to evaluate a rule condition.
    #[error("condition evaluation failed: {reason}")]
    EvaluationError {
        /// The reason the evaluation failed.
        reason: String,
    },

    /// Notification delivery failed.
    #[error("notification via '{channel}' failed: {reason}")]
    NotificationFailed {
        /// The channel that failed.
        channel: String,
        /// The reason the notification failed.
        reason: String,
    },

    /// A notification channel did not answer within its time budget.
    #[error("notification via '{channel}' timed out after {timeout_ms}ms")]
    ChannelTimeout {
        /// The slow channel.
        channel: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// Filesystem I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

impl AlertError {
    pub(crate) fn eval(reason: impl Into<String>) -> Self {
        Self::EvaluationError {
            reason: reason.into(),
        }
    }

    pub(crate) fn notification(channel: impl Into<String>, reason: impl ToString) -> Self {
        Self::NotificationFailed {
            channel: channel.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for alert operations.
pub type Result<T> = std::result::Result<T, AlertError>;

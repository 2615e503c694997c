//! Error types for the vigil-metrics crate.

use thiserror::Error;

/// Errors that can occur while sampling, logging, or recording metrics.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric source failed to produce metrics.
    #[error("source '{name}' failed: {reason}")]
    SourceFailed {
        /// The name of the failing source.
        name: String,
        /// The reason collection failed.
        reason: String,
    },

    /// A metric source did not answer within its time budget.
    #[error("source '{name}' timed out after {timeout_ms}ms")]
    SourceTimeout {
        /// The name of the slow source.
        name: String,
        /// The timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The durable sample log could not be written or read.
    #[error("storage error: {reason}")]
    StorageError {
        /// The reason the storage operation failed.
        reason: String,
    },

    /// Filesystem I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Sampler or experiment configuration is invalid.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// The reason the configuration is invalid.
        reason: String,
    },

    /// A measurement was recorded after the experiment finished.
    #[error("experiment already finished: {id}")]
    ExperimentFinished {
        /// The experiment ID.
        id: String,
    },
}

impl From<serde_json::Error> for MetricsError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

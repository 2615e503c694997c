//! Error types for vigild.

use thiserror::Error;

/// Errors that can occur in daemon and CLI operations.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Alert not found in the snapshot.
    #[error("alert not found: {0}")]
    AlertNotFound(String),

    /// No sample log to read.
    #[error("no sample log found in {0}")]
    NoSampleLog(String),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// Sampling layer error.
    #[error(transparent)]
    Metrics(#[from] vigil_metrics::MetricsError),

    /// Alerting layer error.
    #[error(transparent)]
    Alerts(#[from] vigil_alerts::AlertError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = DaemonError::Config("max_alerts must be greater than 0".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: max_alerts must be greater than 0"
        );
    }

    #[test]
    fn alert_not_found_display() {
        let err = DaemonError::AlertNotFound("cpu_high_1_0".to_string());
        assert_eq!(err.to_string(), "alert not found: cpu_high_1_0");
    }

    #[test]
    fn alert_error_is_transparent() {
        let inner = vigil_alerts::AlertError::RuleNotFound {
            name: "cpu".to_string(),
        };
        let expected = inner.to_string();
        let err = DaemonError::from(inner);
        assert_eq!(err.to_string(), expected);
    }

    #[test]
    fn io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: DaemonError = io.into();
        assert!(matches!(err, DaemonError::Io(_)));
    }
}

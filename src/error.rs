//! Error types for the notifier service.

use thiserror::Error;

/// Common error type for the service.
#[derive(Error, Debug)]
pub enum NotifierError {
    /// Database error.
    ///
    /// Wraps row-level and connection-level failures from sqlx.
    #[error("database error: {0}")]
    Database(String),

    /// Validation error for caller-supplied input (filters, bounds).
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The external producer call itself failed.
    #[error("upstream producer error: {0}")]
    Upstream(String),

    /// Push delivery failure that escaped per-token aggregation.
    #[error("push delivery error: {0}")]
    Delivery(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NotifierError {
    /// Stable machine-readable kind carried in API error objects.
    pub fn kind(&self) -> &'static str {
        match self {
            NotifierError::Database(_) => "persistence_failure",
            NotifierError::Validation(_) => "validation_failure",
            NotifierError::NotFound(_) => "not_found",
            NotifierError::Upstream(_) => "upstream_unavailable",
            NotifierError::Delivery(_) => "delivery_failure",
            NotifierError::Config(_) => "configuration_error",
            NotifierError::Io(_) => "io_error",
        }
    }
}

// Conversion from sqlx errors
impl From<sqlx::Error> for NotifierError {
    fn from(e: sqlx::Error) -> Self {
        NotifierError::Database(e.to_string())
    }
}

/// Result type alias for notifier operations.
pub type Result<T> = std::result::Result<T, NotifierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_display() {
        let err = NotifierError::Validation("min_score greater than max_score".to_string());
        assert_eq!(
            err.to_string(),
            "validation error: min_score greater than max_score"
        );
        assert_eq!(err.kind(), "validation_failure");
    }

    #[test]
    fn not_found_error_display() {
        let err = NotifierError::NotFound("news item".to_string());
        assert_eq!(err.to_string(), "news item not found");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn upstream_error_kind() {
        let err = NotifierError::Upstream("connection refused".to_string());
        assert_eq!(err.kind(), "upstream_unavailable");
    }

    #[test]
    fn result_alias() {
        fn sample_ok() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(sample_ok().unwrap(), 42);
    }
}

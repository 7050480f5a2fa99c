//! Error types and result handling for the incident core

use thiserror::Error;

/// Result type alias for relops operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for incident core operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Unreachable: {0}")]
    Unreachable(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if the error is retryable. Transient dependency failures
    /// (timeouts, refused/reset connections, 5xx responses) are; query,
    /// configuration and not-found errors are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Unreachable(_) | Error::Upstream(_)
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Timeout(_) => "timeout",
            Error::Unreachable(_) => "unreachable",
            Error::Upstream(_) => "upstream",
            Error::InvalidQuery(_) => "invalid_query",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Unavailable(_) => "unavailable",
            Error::Database(_) => "database",
            Error::Serialization(_) => "serialization",
            Error::Adapter(_) => "adapter",
            Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(Error::Timeout("query".into()).is_retryable());
        assert!(Error::Unreachable("connection refused".into()).is_retryable());
        assert!(Error::Upstream("status 503".into()).is_retryable());
    }

    #[test]
    fn permanent_errors_are_not_retryable() {
        assert!(!Error::InvalidQuery("parse error".into()).is_retryable());
        assert!(!Error::Validation("wrong status".into()).is_retryable());
        assert!(!Error::NotFound("incident".into()).is_retryable());
        assert!(!Error::Configuration("missing var".into()).is_retryable());
    }
}

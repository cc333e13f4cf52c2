//! Unified error handling for clickshield.
//!
//! Errors never escape the engine's public entry points: every layer
//! converts failures into degraded scores or fail-open decisions. The
//! types here exist so that internal seams stay honest about what can
//! fail and so that failures carry stable labels for metrics.

use thiserror::Error;

/// Errors raised by counter, reputation, history, and sink backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Backing store could not be reached or refused the operation.
    #[error("backing store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Engine-level errors surfaced inside degraded signal results and
/// `ClickDecision::errors`.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Store(StoreError::Unavailable(_)) => "store_unavailable",
            Self::Store(StoreError::Database(_)) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EngineError::Store(StoreError::Unavailable("redis down".into()));
        assert_eq!(err.error_code(), "store_unavailable");
        assert_eq!(EngineError::Internal("oops".into()).error_code(), "internal_error");
    }

    #[test]
    fn test_store_error_display() {
        let err = StoreError::Unavailable("connection refused".into());
        assert_eq!(err.to_string(), "backing store unavailable: connection refused");
    }
}

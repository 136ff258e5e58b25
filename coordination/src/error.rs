//! Crate-wide error type for the execution core.
//!
//! Every component-local error enum (`EventBusError`, `StoreError`, ...)
//! converts into `CoreError` at its public boundary via `#[from]`, so
//! callers one layer up (the orchestrator, the gateway) only ever match
//! on this one type. The variants mirror the error kinds of the spec
//! rather than Rust type names: `Timeout`/`RateLimited`/`Transient` are
//! retryable, `Unauthorized`/`Fatal` are not, `Internal` is retried once
//! then surfaced.

use thiserror::Error;

/// Result type alias used throughout the core.
pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("fatal error: {0}")]
    Fatal(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreError::Timeout(_)
                | CoreError::RateLimited { .. }
                | CoreError::Transient(_)
                | CoreError::Internal(_)
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        CoreError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        CoreError::PreconditionFailed(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        CoreError::Conflict(msg.into())
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(e.to_string()),
            std::io::ErrorKind::WouldBlock
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::TimedOut => CoreError::Transient(e.to_string()),
            _ => CoreError::Internal(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Validation(format!("json error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(CoreError::Timeout("t".into()).is_retryable());
        assert!(CoreError::RateLimited { retry_after_ms: 10 }.is_retryable());
        assert!(CoreError::Transient("t".into()).is_retryable());
        assert!(CoreError::Internal("t".into()).is_retryable());
        assert!(!CoreError::Unauthorized("u".into()).is_retryable());
        assert!(!CoreError::Fatal("f".into()).is_retryable());
        assert!(!CoreError::Validation("v".into()).is_retryable());
    }

    #[test]
    fn io_not_found_maps_to_not_found() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: CoreError = io.into();
        assert!(matches!(err, CoreError::NotFound(_)));
    }
}

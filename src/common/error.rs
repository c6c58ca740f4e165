//! Error handling primitives shared across the core.
//!
//! The taxonomy is deliberately small: validation and conflict errors are
//! answered synchronously at the API boundary, everything that happens after
//! a job has been accepted is only observable through the read surface or the
//! event plane.

use thiserror::Error;

/// Canonical error type for the core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad parameters, rejected synchronously at the API boundary.
    #[error("validation: {0}")]
    Validation(String),
    /// Duplicate active job or duplicate running A/B test.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Requested entity was not available.
    #[error("not found: {0}")]
    NotFound(String),
    /// Trainer capability failed; never propagated to the original caller.
    #[error("training: {0}")]
    Training(String),
    /// Broker publish failure; logged and swallowed by the event bus.
    #[error("broker: {0}")]
    Broker(String),
    /// Durable storage failure.
    #[error("store: {0}")]
    Store(String),
}

/// Result alias used throughout the crate.
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Validation helper.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Conflict helper.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Missing entity helper.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Trainer failure helper.
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Broker failure helper.
    pub fn broker(msg: impl Into<String>) -> Self {
        Self::Broker(msg.into())
    }

    /// Storage failure helper.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether the error is answered to the caller as a client mistake.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Conflict(_) | Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_classified() {
        assert!(CoreError::validation("x").is_client_error());
        assert!(CoreError::conflict("x").is_client_error());
        assert!(CoreError::not_found("x").is_client_error());
        assert!(!CoreError::training("x").is_client_error());
        assert!(!CoreError::broker("x").is_client_error());
    }
}

//! Engine error types

use thiserror::Error;

/// Failure of a single provider call, classified at the transport boundary.
///
/// `retryable` is decided exactly once, by the provider's classifier
/// (HTTP 429 for REST transports, throttling signatures in stderr for CLI
/// transports). Everything downstream branches on the flag, never on the
/// message text.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CallError {
    /// HTTP status code or CLI exit code, when one was observed.
    pub code: Option<i64>,

    /// Raw upstream error detail (response body or stderr).
    pub message: String,

    /// Whether the call may be retried under the backoff schedule.
    pub retryable: bool,
}

impl CallError {
    pub fn fatal(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn rate_limited(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            retryable: true,
        }
    }
}

/// Reconciliation engine errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("{0}")]
    Call(#[from] CallError),

    #[error("operation failed: {0}")]
    OperationFailed(String),

    #[error("operation canceled: {0}")]
    OperationCanceled(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CloudError>;

//! Remote client errors

use std::time::Duration;

use thiserror::Error;

/// Errors returned by a remote client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure; the request may not have reached the service
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),

    /// The service answered with an error status
    #[error("Remote service rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request went through but one of its commands failed
    #[error("Remote command '{command}' failed: {message}")]
    CommandFailed { command: String, message: String },

    /// No answer within the request deadline
    #[error("Remote call timed out after {0:?}")]
    Timeout(Duration),

    /// The response body could not be understood
    #[error("Invalid response from remote service: {0}")]
    Decode(String),

    /// Client is missing required settings (e.g. API token)
    #[error("Remote client not configured: {0}")]
    NotConfigured(String),
}

impl RemoteError {
    /// Returns true if repeating the same request may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Unavailable(_) | RemoteError::Timeout(_) => true,
            RemoteError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type for remote calls
pub type RemoteResult<T> = Result<T, RemoteError>;

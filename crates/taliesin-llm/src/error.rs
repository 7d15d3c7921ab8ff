//! Error types for the LLM crate.

use thiserror::Error;

/// Result type alias using the LLM error type.
pub type Result<T> = std::result::Result<T, LlmError>;

/// Error type for LLM operations.
///
/// All variants carry plain strings so errors can be cloned into scripted
/// mock streams and logged without holding transport internals alive.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// API error from the provider (malformed response, 5xx, unexpected body).
    #[error("API error: {0}")]
    Api(String),

    /// Network/connectivity error (retryable).
    #[error("Network error: {0}")]
    Network(String),

    /// Configuration error (API key missing, bad base URL, etc.).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rate limit exceeded (retryable with backoff).
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Authentication failed.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// The remote conversational session is no longer recognized.
    ///
    /// Distinct from [`LlmError::Api`] because the caller is expected to
    /// discard its session handle and rebuild before retrying.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LlmError {
    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimit(_))
    }

    /// Returns true if the remote session must be rebuilt before retrying.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_))
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            LlmError::Network(format!("Connection failed: {}", err))
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        LlmError::Serialization(err.to_string())
    }
}

/// Check if an error is retryable.
///
/// Network errors and rate limit errors are retryable. Config, auth, and
/// session-expiry errors should not be retried at this layer.
pub fn is_retryable(error: &LlmError) -> bool {
    error.is_retryable()
}

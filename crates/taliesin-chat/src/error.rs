//! Error types for the conversation orchestrator.

use taliesin_llm::LlmError;
use taliesin_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors raised while driving a conversation.
///
/// Tool argument problems never appear here: they are folded into the
/// textual tool result so the model can recover conversationally.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Transport or provider failure.
    #[error("Backend error: {0}")]
    Llm(#[from] LlmError),

    /// Record store failure outside of tool execution.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Missing credential or invalid client setup; fails before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The model kept requesting tools past the defensive cap.
    #[error("Maximum tool rounds exceeded: {0}")]
    MaxToolRounds(u32),

    /// The in-flight turn was cancelled by the caller.
    #[error("Turn cancelled")]
    Cancelled,

    /// A transcript operation was applied to a turn that cannot accept it.
    #[error("Transcript error: {0}")]
    Transcript(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ChatError {
    pub fn config(msg: impl Into<String>) -> Self {
        ChatError::Config(msg.into())
    }

    pub fn transcript(msg: impl Into<String>) -> Self {
        ChatError::Transcript(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ChatError::Internal(msg.into())
    }

    /// True when the underlying transport reported the remote session as
    /// gone. The caller is expected to retry once; the session has already
    /// been invalidated by the time this surfaces.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ChatError::Llm(e) if e.is_session_expired())
    }
}

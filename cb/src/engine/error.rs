//! Engine error types

use thiserror::Error;

use crate::llm::LlmError;
use crate::session::SessionError;

/// Failures surfaced by [`super::ConversationEngine`]
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid or missing session id '{0}'. Please start a diagnosis first.")]
    InvalidSession(String),

    #[error("Message is empty")]
    EmptyMessage,

    #[error("Language model call failed: {0}")]
    UpstreamModel(#[from] LlmError),

    #[error("Failed to build prompt: {0}")]
    Prompt(String),

    #[error("No field conditions configured; add a `field` section to the config")]
    FieldSeedMissing,
}

impl EngineError {
    /// True when the caller sent a bad request, false for server-side failures
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidSession(_) | Self::EmptyMessage)
    }
}

impl From<SessionError> for EngineError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::InvalidSession(id),
        }
    }
}

//! Error types for the dialogue engine.

use voyage_core::error::VoyageError;
use voyage_inference::GatewayError;

use crate::router::DialogueState;

/// Errors from the dialogue engine.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("conversation cannot be empty")]
    EmptyConversation,
    #[error("message exceeds maximum length of {0} characters")]
    MessageTooLong(usize),
    #[error("conversation exceeds maximum of {0} turns")]
    TooManyTurns(usize),
    #[error("inference failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("knowledge base error: {0}")]
    KnowledgeBase(#[from] VoyageError),
    #[error("invalid dialogue transition from {0:?} to {1:?}")]
    InvalidTransition(DialogueState, DialogueState),
    #[error("client disconnected")]
    Cancelled,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChatError {
    /// Whether this error rejects the request before any processing.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ChatError::EmptyConversation | ChatError::MessageTooLong(_) | ChatError::TooManyTurns(_)
        )
    }
}

/// Failure to hand a finished itinerary to the document/email service.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no recipient email address is available")]
    MissingRecipient,
    #[error("{0}")]
    Rejected(String),
    #[error("dispatch request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid dispatch response: {0}")]
    InvalidResponse(String),
}

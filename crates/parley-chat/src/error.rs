//! Error types for the conversation widget.

use parley_client::ServiceError;
use parley_core::error::ParleyError;

/// Inline text shown when a send fails without a server-provided reason.
pub const SEND_FAILED_MESSAGE: &str = "Failed to send message. Please try again.";

/// Errors from the chat widget.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("a message is already being sent")]
    SendInFlight,
    #[error("chat widget is not active")]
    Inactive,
    #[error("conversation service error: {0}")]
    Service(#[from] ServiceError),
    #[error("speech recognition is not available")]
    SpeechUnavailable,
    #[error("speech error: {0}")]
    Speech(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("state error: {0}")]
    State(String),
}

impl From<ParleyError> for ChatError {
    fn from(err: ParleyError) -> Self {
        ChatError::Storage(err.to_string())
    }
}

impl ChatError {
    /// Text suitable for the widget's inline error line.
    pub fn inline_message(&self) -> String {
        match self {
            ChatError::Service(e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| SEND_FAILED_MESSAGE.to_string()),
            other => other.to_string(),
        }
    }
}

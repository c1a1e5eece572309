//! The conversation service port.

use async_trait::async_trait;

use parley_core::types::{Identity, SessionId};

use crate::error::ServiceError;
use crate::wire::{ChatPayload, SendMessageRequest};

/// Remote conversation backend.
///
/// The chat widget only talks to the backend through this trait, so tests
/// can substitute scripted fakes for the HTTP client.
#[async_trait]
pub trait ConversationService: Send + Sync {
    /// Most recent conversation of `identity`.
    async fn latest_for_user(&self, identity: &Identity) -> Result<ChatPayload, ServiceError>;

    /// A specific conversation by id.
    async fn fetch_chat(&self, chat_id: &SessionId) -> Result<ChatPayload, ServiceError>;

    /// Append a user message and return the full, server-ordered transcript.
    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<ChatPayload, ServiceError>;
}

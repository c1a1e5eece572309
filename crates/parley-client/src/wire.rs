//! JSON bodies of the chat endpoints.
//!
//! Field names follow the service's camelCase convention.

use serde::{Deserialize, Serialize};

use parley_core::types::{Identity, Message, SessionId};

/// Response of `GET /api/chat/user/{identity}/latest`, `GET /api/chat/{chatId}`
/// and `POST /api/chat`.
///
/// `chatId` is absent on the by-id endpoint; the caller already knows it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<SessionId>,
    #[serde(default)]
    pub messages: Vec<Message>,
}

/// Body of `POST /api/chat`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// `null` starts a new conversation.
    pub chat_id: Option<SessionId>,
    /// `null` when no identity could be resolved.
    pub user_id: Option<Identity>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags_text: Option<String>,
}

/// Optional error body carried by non-2xx responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

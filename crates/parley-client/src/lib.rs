//! Client side of the conversation service.
//!
//! Defines the `ConversationService` port used by the chat widget, the JSON
//! wire types of the three chat endpoints, and a reqwest-backed HTTP
//! implementation.

pub mod error;
pub mod http;
pub mod service;
pub mod wire;

pub use error::ServiceError;
pub use http::HttpConversationClient;
pub use service::ConversationService;
pub use wire::{ChatPayload, ErrorBody, SendMessageRequest};

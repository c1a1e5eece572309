//! Conversation session protocol.
//!
//! Resolves who the user is, hydrates their most relevant prior
//! conversation, runs the serialized optimistic send exchange, merges
//! speech input into the message buffer and resets sessions locally.
//! `ChatWidget` composes these behind one activation-scoped handle.

pub mod error;
pub mod exchange;
pub mod history;
pub mod identity;
pub mod reset;
pub mod speech;
pub mod state;
pub mod ticker;
pub mod widget;

#[cfg(test)]
mod testing;

pub use error::{ChatError, SEND_FAILED_MESSAGE};
pub use exchange::{MessageExchange, PendingSend, SendOutcome};
pub use history::{
    HistoryLoader, HistoryMode, HistorySource, Hydration, HydrationTier, PersistedRecordSource,
    ServerLatestSource, SourceFailure, HISTORY_FAILED_MESSAGE,
};
pub use identity::IdentityResolver;
pub use reset::SessionResetter;
pub use speech::{SpeechCapability, SpeechEvent, SpeechInputMerger, SpeechUpdate};
pub use state::{ConversationState, ExchangePhase};
pub use ticker::{StatusTicker, TickerRun};
pub use widget::{ChatWidget, WidgetOptions, WidgetSnapshot, SPEECH_UNAVAILABLE_NOTICE};

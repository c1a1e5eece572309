//! Message exchange.
//!
//! A send is split in three steps so the caller can release its state lock
//! while the request is outstanding:
//! - `begin` validates the input, appends the user message optimistically
//!   and enters `Sending`.
//! - `dispatch` performs the network call.
//! - `finish` leaves `Sending` and reconciles the transcript with the reply.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parley_client::{ChatPayload, ConversationService, SendMessageRequest, ServiceError};
use parley_core::types::{Message, SessionId};
use parley_storage::SessionRecords;

use crate::error::ChatError;
use crate::state::{ConversationState, ExchangePhase};

/// A send that has been started and not yet reconciled.
#[derive(Debug, Clone)]
pub struct PendingSend {
    request: SendMessageRequest,
    epoch: u64,
}

impl PendingSend {
    pub fn request(&self) -> &SendMessageRequest {
        &self.request
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Result of reconciling a send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server transcript was adopted.
    Delivered { session_id: Option<SessionId> },
    /// The session was discarded while the request was outstanding.
    Discarded,
}

/// Serialized, optimistic send protocol.
pub struct MessageExchange {
    service: Arc<dyn ConversationService>,
    records: SessionRecords,
    tags_text: Option<String>,
}

impl MessageExchange {
    pub fn new(
        service: Arc<dyn ConversationService>,
        records: SessionRecords,
        tags_text: Option<String>,
    ) -> Self {
        Self {
            service,
            records,
            tags_text: tags_text.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Start a send from the current input buffer.
    ///
    /// On success the user message is already in the transcript and the
    /// input buffer is empty. On error nothing was changed.
    pub fn begin(&self, state: &mut ConversationState) -> Result<PendingSend, ChatError> {
        if state.is_sending() {
            return Err(ChatError::SendInFlight);
        }
        let text = state.input.trim();
        if text.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        let text = text.to_string();

        state.transition(ExchangePhase::Sending)?;
        state.session.push(Message::user(text.clone()));
        state.input.clear();
        state.error = None;

        debug!(
            chat_id = ?state.session.session_id,
            epoch = state.epoch,
            "Message queued for send"
        );

        Ok(PendingSend {
            request: SendMessageRequest {
                chat_id: state.session.session_id.clone(),
                user_id: state.session.identity.clone(),
                message: text,
                tags_text: self.tags_text.clone(),
            },
            epoch: state.epoch,
        })
    }

    pub async fn dispatch(&self, pending: &PendingSend) -> Result<ChatPayload, ServiceError> {
        self.service.send_message(&pending.request).await
    }

    /// Leave `Sending` and apply the reply.
    ///
    /// A reply for an older epoch only releases the phase; the session it
    /// belonged to is gone.
    pub fn finish(
        &self,
        state: &mut ConversationState,
        pending: PendingSend,
        result: Result<ChatPayload, ServiceError>,
    ) -> Result<SendOutcome, ChatError> {
        if state.is_sending() {
            state.transition(ExchangePhase::Idle)?;
        }

        if state.epoch != pending.epoch {
            info!(
                sent_epoch = pending.epoch,
                current_epoch = state.epoch,
                "Discarding reply for a discarded session"
            );
            return Ok(SendOutcome::Discarded);
        }

        let payload = match result {
            Ok(payload) => payload,
            Err(e) => {
                let err = ChatError::Service(e);
                warn!(chat_id = ?pending.request.chat_id, error = %err, "Send failed");
                state.error = Some(err.inline_message());
                return Err(err);
            }
        };

        state.session.transcript = payload.messages;
        if let Some(chat_id) = payload.chat_id {
            self.adopt(state, chat_id);
        }

        debug!(
            chat_id = ?state.session.session_id,
            messages = state.session.transcript.len(),
            "Reply reconciled"
        );
        Ok(SendOutcome::Delivered {
            session_id: state.session.session_id.clone(),
        })
    }

    fn adopt(&self, state: &mut ConversationState, chat_id: SessionId) {
        if state.session.session_id.as_ref() == Some(&chat_id) {
            return;
        }
        if let Some(previous) = &state.session.session_id {
            warn!(previous = %previous, chat_id = %chat_id, "Server moved the conversation");
        }
        if let Some(identity) = &state.session.identity {
            if let Err(e) = self.records.set(identity, &chat_id) {
                warn!(identity = %identity, error = %e, "Failed to store session record");
            }
        }
        info!(chat_id = %chat_id, "Session bound");
        state.session.session_id = Some(chat_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SEND_FAILED_MESSAGE;
    use crate::testing::ScriptedService;
    use parley_core::types::Identity;
    use parley_storage::MemoryKeyValueStore;

    fn identity() -> Identity {
        Identity::new("u1").unwrap()
    }

    fn setup(tags: Option<&str>) -> (Arc<ScriptedService>, SessionRecords, MessageExchange) {
        let service = Arc::new(ScriptedService::new());
        let records = SessionRecords::new(Arc::new(MemoryKeyValueStore::new()), "chatId_");
        let exchange = MessageExchange::new(
            service.clone(),
            records.clone(),
            tags.map(str::to_string),
        );
        (service, records, exchange)
    }

    fn state_with_input(text: &str) -> ConversationState {
        let mut state = ConversationState::new(Some(identity()), 0);
        state.input = text.to_string();
        state
    }

    async fn send(exchange: &MessageExchange, state: &mut ConversationState) -> Result<SendOutcome, ChatError> {
        let pending = exchange.begin(state)?;
        let result = exchange.dispatch(&pending).await;
        exchange.finish(state, pending, result)
    }

    // =========================================================================
    // begin
    // =========================================================================

    #[test]
    fn test_begin_appends_optimistically() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("Hello");

        let pending = exchange.begin(&mut state).unwrap();

        assert_eq!(state.session.transcript.last(), Some(&Message::user("Hello")));
        assert!(state.input.is_empty());
        assert!(state.is_sending());
        assert_eq!(pending.request().chat_id, None);
        assert_eq!(pending.request().user_id, Some(identity()));
        assert_eq!(pending.request().message, "Hello");
    }

    #[test]
    fn test_begin_trims_message() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("  Hello \n");
        let pending = exchange.begin(&mut state).unwrap();
        assert_eq!(pending.request().message, "Hello");
    }

    #[test]
    fn test_begin_rejects_blank_input() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("   ");
        assert!(matches!(exchange.begin(&mut state), Err(ChatError::EmptyMessage)));
        assert!(state.session.transcript.is_empty());
        assert_eq!(state.input, "   ");
        assert!(!state.is_sending());
    }

    #[test]
    fn test_begin_rejects_second_send() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("one");
        exchange.begin(&mut state).unwrap();
        state.input = "two".to_string();

        assert!(matches!(exchange.begin(&mut state), Err(ChatError::SendInFlight)));
        assert_eq!(state.session.transcript, vec![Message::user("one")]);
        assert_eq!(state.input, "two");
    }

    #[test]
    fn test_begin_clears_previous_error() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("retry");
        state.error = Some("old".to_string());
        exchange.begin(&mut state).unwrap();
        assert!(state.error.is_none());
    }

    #[test]
    fn test_tags_text_is_attached() {
        let (_service, _records, exchange) = setup(Some("job:42"));
        let mut state = state_with_input("hi");
        let pending = exchange.begin(&mut state).unwrap();
        assert_eq!(pending.request().tags_text.as_deref(), Some("job:42"));
    }

    #[test]
    fn test_blank_tags_text_is_omitted() {
        let (_service, _records, exchange) = setup(Some("  "));
        let mut state = state_with_input("hi");
        let pending = exchange.begin(&mut state).unwrap();
        assert!(pending.request().tags_text.is_none());
    }

    // =========================================================================
    // finish
    // =========================================================================

    #[tokio::test]
    async fn test_success_adopts_server_transcript_and_id() {
        let (_service, records, exchange) = setup(None);
        let mut state = state_with_input("Hello");

        let outcome = send(&exchange, &mut state).await.unwrap();

        assert_eq!(
            outcome,
            SendOutcome::Delivered {
                session_id: Some(SessionId::from("srv-1"))
            }
        );
        assert_eq!(
            state.session.transcript,
            vec![Message::user("Hello"), Message::assistant("echo: Hello")]
        );
        assert!(!state.is_sending());
        assert_eq!(records.get(&identity()).unwrap(), Some(SessionId::from("srv-1")));
    }

    #[tokio::test]
    async fn test_same_message_twice_is_not_deduplicated() {
        let (service, _records, exchange) = setup(None);
        let mut state = state_with_input("Hello");
        send(&exchange, &mut state).await.unwrap();
        state.input = "Hello".to_string();
        send(&exchange, &mut state).await.unwrap();

        assert_eq!(
            state.session.transcript,
            vec![
                Message::user("Hello"),
                Message::assistant("echo: Hello"),
                Message::user("Hello"),
                Message::assistant("echo: Hello"),
            ]
        );
        let sent = service.sent();
        assert_eq!(sent[0].chat_id, None);
        assert_eq!(sent[1].chat_id, Some(SessionId::from("srv-1")));
    }

    #[tokio::test]
    async fn test_failure_keeps_optimistic_message() {
        let (service, records, exchange) = setup(None);
        service.push_send(Err(ServiceError::Status {
            status: 500,
            message: None,
        }));
        let mut state = state_with_input("Hello");

        let err = send(&exchange, &mut state).await.unwrap_err();

        assert!(matches!(err, ChatError::Service(_)));
        assert_eq!(state.session.transcript, vec![Message::user("Hello")]);
        assert_eq!(state.error.as_deref(), Some(SEND_FAILED_MESSAGE));
        assert!(!state.is_sending());
        assert!(state.session.session_id.is_none());
        assert_eq!(records.get(&identity()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_failure_shows_server_message() {
        let (service, _records, exchange) = setup(None);
        service.push_send(Err(ServiceError::Status {
            status: 429,
            message: Some("Slow down".to_string()),
        }));
        let mut state = state_with_input("Hello");
        send(&exchange, &mut state).await.unwrap_err();
        assert_eq!(state.error.as_deref(), Some("Slow down"));
    }

    #[tokio::test]
    async fn test_retry_after_failure_reconciles() {
        let (service, _records, exchange) = setup(None);
        service.push_send(Err(ServiceError::Transport("offline".to_string())));
        let mut state = state_with_input("Hello");
        send(&exchange, &mut state).await.unwrap_err();

        state.input = "Hello".to_string();
        send(&exchange, &mut state).await.unwrap();

        // The server never saw the failed attempt.
        assert_eq!(
            state.session.transcript,
            vec![Message::user("Hello"), Message::assistant("echo: Hello")]
        );
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_reply_without_chat_id_keeps_current() {
        let (service, records, exchange) = setup(None);
        service.push_send(Ok(ChatPayload {
            chat_id: None,
            messages: vec![Message::user("hi"), Message::assistant("yo")],
        }));
        let mut state = state_with_input("hi");
        state.session.session_id = Some(SessionId::from("c1"));

        send(&exchange, &mut state).await.unwrap();

        assert_eq!(state.session.session_id, Some(SessionId::from("c1")));
        assert_eq!(records.get(&identity()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_unresolved_identity_does_not_persist() {
        let (_service, records, exchange) = setup(None);
        let mut state = ConversationState::new(None, 0);
        state.input = "hi".to_string();

        send(&exchange, &mut state).await.unwrap();

        assert_eq!(state.session.session_id, Some(SessionId::from("srv-1")));
        assert_eq!(records.get(&identity()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_stale_epoch_is_discarded() {
        let (_service, _records, exchange) = setup(None);
        let mut state = state_with_input("Hello");
        let pending = exchange.begin(&mut state).unwrap();
        let result = exchange.dispatch(&pending).await;

        state.session.clear();
        state.epoch += 1;

        let outcome = exchange.finish(&mut state, pending, result).unwrap();
        assert_eq!(outcome, SendOutcome::Discarded);
        assert!(state.session.transcript.is_empty());
        assert!(state.session.session_id.is_none());
        assert!(!state.is_sending());
    }
}

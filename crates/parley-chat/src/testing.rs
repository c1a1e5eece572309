//! Scripted fakes shared by the unit tests of this crate.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use parley_client::{ChatPayload, ConversationService, SendMessageRequest, ServiceError};
use parley_core::types::{Identity, Message, SessionId};

use crate::speech::SpeechCapability;

type Reply = Result<ChatPayload, ServiceError>;

fn not_found() -> ServiceError {
    ServiceError::Status {
        status: 404,
        message: None,
    }
}

/// `ConversationService` fake.
///
/// Queued replies are served first. With an empty send queue the fake acts
/// as an echo server that keeps its own transcript per chat.
#[derive(Default)]
pub struct ScriptedService {
    latest: Mutex<VecDeque<Reply>>,
    fetch: Mutex<VecDeque<Reply>>,
    send: Mutex<VecDeque<Reply>>,
    latest_calls: AtomicUsize,
    fetched: Mutex<Vec<SessionId>>,
    sent: Mutex<Vec<SendMessageRequest>>,
    server_transcript: Mutex<Vec<Message>>,
    gate: Option<Arc<Semaphore>>,
    send_started: Notify,
    latest_gate: Option<Arc<Semaphore>>,
    latest_started: Notify,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fake whose sends block until the returned semaphore gets a permit.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let service = Self {
            gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (service, gate)
    }

    /// A fake whose latest-conversation lookups block until the returned
    /// semaphore gets a permit. Each lookup takes its reply off the queue
    /// before blocking, so queued replies are matched to calls in order.
    pub fn gated_latest() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let service = Self {
            latest_gate: Some(Arc::clone(&gate)),
            ..Self::default()
        };
        (service, gate)
    }

    pub fn push_latest(&self, reply: Reply) {
        self.latest.lock().unwrap().push_back(reply);
    }

    pub fn push_fetch(&self, reply: Reply) {
        self.fetch.lock().unwrap().push_back(reply);
    }

    pub fn push_send(&self, reply: Reply) {
        self.send.lock().unwrap().push_back(reply);
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetched.lock().unwrap().len()
    }

    pub fn fetched_ids(&self) -> Vec<SessionId> {
        self.fetched.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<SendMessageRequest> {
        self.sent.lock().unwrap().clone()
    }

    /// Resolves once a send has reached the fake.
    pub async fn wait_for_send(&self) {
        self.send_started.notified().await;
    }

    /// Resolves once a latest-conversation lookup has reached the fake.
    pub async fn wait_for_latest(&self) {
        self.latest_started.notified().await;
    }
}

#[async_trait]
impl ConversationService for ScriptedService {
    async fn latest_for_user(&self, _identity: &Identity) -> Result<ChatPayload, ServiceError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .latest
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_found()));
        self.latest_started.notify_one();
        if let Some(gate) = &self.latest_gate {
            gate.acquire().await.unwrap().forget();
        }
        reply
    }

    async fn fetch_chat(&self, chat_id: &SessionId) -> Result<ChatPayload, ServiceError> {
        self.fetched.lock().unwrap().push(chat_id.clone());
        self.fetch
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(not_found()))
    }

    async fn send_message(
        &self,
        request: &SendMessageRequest,
    ) -> Result<ChatPayload, ServiceError> {
        self.sent.lock().unwrap().push(request.clone());
        self.send_started.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        if let Some(reply) = self.send.lock().unwrap().pop_front() {
            return reply;
        }

        let mut transcript = self.server_transcript.lock().unwrap();
        transcript.push(Message::user(request.message.clone()));
        transcript.push(Message::assistant(format!("echo: {}", request.message)));
        Ok(ChatPayload {
            chat_id: Some(
                request
                    .chat_id
                    .clone()
                    .unwrap_or_else(|| SessionId::from("srv-1")),
            ),
            messages: transcript.clone(),
        })
    }
}

/// Records capability calls; can be told to refuse to start.
#[derive(Clone, Default)]
pub struct FakeSpeech {
    pub log: Arc<Mutex<Vec<String>>>,
    pub refuse_start: bool,
}

impl FakeSpeech {
    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SpeechCapability for FakeSpeech {
    fn start(&mut self, locale: &str) -> Result<(), String> {
        if self.refuse_start {
            return Err("not-allowed".to_string());
        }
        self.log.lock().unwrap().push(format!("start:{}", locale));
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().push("stop".to_string());
    }
}

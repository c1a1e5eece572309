//! Chat widget.
//!
//! `ChatWidget` composes identity resolution, history hydration, the message
//! exchange, speech input and reset behind a single handle that a
//! presentation layer drives. Every asynchronous operation is bound to the
//! current activation's cancellation token; results that arrive after the
//! widget was deactivated or re-activated are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_client::ConversationService;
use parley_core::config::ParleyConfig;
use parley_core::types::{Identity, Message, SessionId};
use parley_storage::{KeyValueStore, SessionRecords};

use crate::error::ChatError;
use crate::exchange::{MessageExchange, SendOutcome};
use crate::history::{HistoryLoader, HistoryMode, HydrationTier};
use crate::identity::IdentityResolver;
use crate::reset::SessionResetter;
use crate::speech::{SpeechCapability, SpeechEvent, SpeechInputMerger, SpeechUpdate};
use crate::state::ConversationState;
use crate::ticker::StatusTicker;

/// Notice shown when voice input is requested but not available.
pub const SPEECH_UNAVAILABLE_NOTICE: &str = "Voice input is not supported in this environment.";

/// Behaviour knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct WidgetOptions {
    pub history: HistoryMode,
    pub speech_enabled: bool,
    pub speech_locale: String,
}

impl WidgetOptions {
    pub fn from_config(config: &ParleyConfig) -> Self {
        let history = if config.chat.skip_history {
            HistoryMode::Skip {
                opening_message: config.chat.opening_message.clone(),
            }
        } else {
            HistoryMode::Resume
        };
        Self {
            history,
            speech_enabled: config.speech.enabled,
            speech_locale: config.speech.locale.clone(),
        }
    }
}

/// Point-in-time view of the widget for rendering.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetSnapshot {
    pub transcript: Vec<Message>,
    pub session_id: Option<SessionId>,
    pub identity: Option<Identity>,
    pub input: String,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub active: bool,
    /// Hydration finished; the transcript is stable for display.
    pub ready: bool,
    pub sending: bool,
    pub listening: bool,
    pub interim: Option<String>,
    pub status: Option<String>,
}

struct Activation {
    id: Uuid,
    token: CancellationToken,
}

struct WidgetState {
    conversation: ConversationState,
    speech: SpeechInputMerger,
    capability: Option<Box<dyn SpeechCapability>>,
    activation: Option<Activation>,
    ready: bool,
    next_epoch: u64,
}

impl WidgetState {
    fn live_activation(&self) -> Result<(Uuid, CancellationToken), ChatError> {
        match &self.activation {
            Some(a) if !a.token.is_cancelled() => Ok((a.id, a.token.clone())),
            _ => Err(ChatError::Inactive),
        }
    }

    fn is_live(&self, id: Uuid) -> bool {
        matches!(&self.activation, Some(a) if a.id == id && !a.token.is_cancelled())
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch = self.next_epoch.wrapping_add(1);
        self.next_epoch
    }

    fn stop_capture(&mut self) {
        if !self.speech.is_listening() {
            return;
        }
        if let Some(capability) = self.capability.as_mut() {
            capability.stop();
        }
        self.speech.end();
        debug!("Speech capture stopped");
    }
}

/// The conversation widget.
pub struct ChatWidget {
    resolver: IdentityResolver,
    history: HistoryLoader,
    exchange: MessageExchange,
    resetter: SessionResetter,
    ticker: StatusTicker,
    options: WidgetOptions,
    state: Mutex<WidgetState>,
}

impl std::fmt::Debug for ChatWidget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatWidget")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ChatWidget {
    /// Build a widget over a conversation service and a local store.
    ///
    /// The same store backs the user profile lookup and session records.
    pub fn new(
        service: Arc<dyn ConversationService>,
        store: Arc<dyn KeyValueStore>,
        config: &ParleyConfig,
    ) -> Self {
        let records = SessionRecords::new(
            Arc::clone(&store),
            config.storage.session_key_prefix.clone(),
        );
        Self {
            resolver: IdentityResolver::new(store, &config.identity),
            history: HistoryLoader::standard(Arc::clone(&service), records.clone()),
            exchange: MessageExchange::new(service, records.clone(), config.chat.tags_text.clone()),
            resetter: SessionResetter::new(records),
            ticker: StatusTicker::new(
                config.chat.status_messages.clone(),
                Duration::from_millis(config.chat.status_interval_ms),
            ),
            options: WidgetOptions::from_config(config),
            state: Mutex::new(WidgetState {
                conversation: ConversationState::default(),
                speech: SpeechInputMerger::new(),
                capability: None,
                activation: None,
                ready: false,
                next_epoch: 0,
            }),
        }
    }

    /// Attach a platform speech capability.
    pub fn with_speech(mut self, capability: Box<dyn SpeechCapability>) -> Self {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        state.capability = Some(capability);
        self
    }

    pub fn with_history(mut self, mode: HistoryMode) -> Self {
        self.options.history = mode;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, WidgetState>, ChatError> {
        self.state
            .lock()
            .map_err(|e| ChatError::State(format!("Widget state lock poisoned: {}", e)))
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Activate the widget and hydrate history.
    ///
    /// Any previous activation is cancelled first. Hydration failures never
    /// fail activation; they surface as the inline error instead.
    pub async fn activate(&self, explicit_identity: Option<&str>) -> Result<HydrationTier, ChatError> {
        let identity = self.resolver.resolve(explicit_identity);

        let (activation_id, token, epoch) = {
            let mut state = self.lock()?;
            if let Some(previous) = state.activation.take() {
                previous.token.cancel();
            }
            state.stop_capture();
            let epoch = state.bump_epoch();
            state.conversation = ConversationState::new(identity.clone(), epoch);
            state.ready = false;
            let activation = Activation {
                id: Uuid::new_v4(),
                token: CancellationToken::new(),
            };
            let handle = (activation.id, activation.token.clone(), epoch);
            state.activation = Some(activation);
            handle
        };

        info!(
            activation = %activation_id,
            identity = ?identity.as_ref().map(Identity::as_str),
            "Chat widget activated"
        );

        let hydration = tokio::select! {
            biased;
            _ = token.cancelled() => {
                debug!(activation = %activation_id, "Hydration abandoned");
                return Err(ChatError::Inactive);
            }
            hydration = self.history.load(identity.as_ref(), &self.options.history) => hydration,
        };

        let mut state = self.lock()?;
        if !state.is_live(activation_id) {
            debug!(activation = %activation_id, "Hydration result dropped");
            return Err(ChatError::Inactive);
        }
        state.ready = true;
        if state.conversation.epoch != epoch {
            debug!(activation = %activation_id, "Session reset during hydration; result dropped");
            return Ok(HydrationTier::Empty);
        }

        // Still holding the lock, so a reset cannot slip in before the record is written.
        self.history.commit(&hydration);
        state.conversation.error = hydration.notices.last().cloned();
        state.conversation.session = hydration.session;
        Ok(hydration.tier)
    }

    /// Deactivate the widget.
    ///
    /// Outstanding work is abandoned and the in-memory session discarded.
    /// Nothing is deleted locally or remotely.
    pub fn deactivate(&self) -> Result<(), ChatError> {
        let mut state = self.lock()?;
        let Some(activation) = state.activation.take() else {
            return Ok(());
        };
        activation.token.cancel();
        state.stop_capture();
        let epoch = state.bump_epoch();
        state.conversation = ConversationState::new(None, epoch);
        state.ready = false;
        info!(activation = %activation.id, "Chat widget deactivated");
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.lock()
            .map(|state| state.live_activation().is_ok())
            .unwrap_or(false)
    }

    // =========================================================================
    // Input and exchange
    // =========================================================================

    pub fn set_input(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.lock()?.conversation.input = text.into();
        Ok(())
    }

    pub fn input(&self) -> Result<String, ChatError> {
        Ok(self.lock()?.conversation.input.clone())
    }

    /// Send the input buffer.
    ///
    /// Speech capture is stopped before the message is taken. The status
    /// ticker runs while the request is outstanding.
    pub async fn submit(&self) -> Result<SendOutcome, ChatError> {
        let (pending, activation_id, token) = {
            let mut state = self.lock()?;
            let (activation_id, token) = state.live_activation()?;
            if !state.ready {
                return Err(ChatError::State(
                    "conversation history is still loading".to_string(),
                ));
            }
            state.stop_capture();
            let pending = self.exchange.begin(&mut state.conversation)?;
            (pending, activation_id, token)
        };

        let ticker = self.ticker.start(&token);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!(activation = %activation_id, "Send abandoned on deactivation");
                return Ok(SendOutcome::Discarded);
            }
            result = self.exchange.dispatch(&pending) => result,
        };
        ticker.stop();

        let mut state = self.lock()?;
        if !state.is_live(activation_id) {
            return Ok(SendOutcome::Discarded);
        }
        self.exchange.finish(&mut state.conversation, pending, result)
    }

    /// Start a fresh conversation. Local only.
    pub fn reset(&self) -> Result<(), ChatError> {
        let mut state = self.lock()?;
        self.resetter.reset(&mut state.conversation);
        Ok(())
    }

    // =========================================================================
    // Speech
    // =========================================================================

    pub fn start_listening(&self) -> Result<(), ChatError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        state.live_activation()?;
        if state.speech.is_listening() {
            return Ok(());
        }

        let capability = match state.capability.as_mut() {
            Some(capability) if self.options.speech_enabled => capability,
            _ => {
                info!("Voice input requested but unavailable");
                state.conversation.notice = Some(SPEECH_UNAVAILABLE_NOTICE.to_string());
                return Err(ChatError::SpeechUnavailable);
            }
        };

        let locale = self.options.speech_locale.as_str();
        match capability.start(locale) {
            Ok(()) => {
                state.speech.begin();
                state.conversation.notice = None;
                debug!(locale = %locale, "Speech capture started");
                Ok(())
            }
            Err(reason) => {
                warn!(reason = %reason, "Speech capability refused to start");
                Err(ChatError::Speech(reason))
            }
        }
    }

    pub fn stop_listening(&self) -> Result<(), ChatError> {
        self.lock()?.stop_capture();
        Ok(())
    }

    /// Toggle capture. Returns whether the widget is now listening.
    pub fn toggle_listening(&self) -> Result<bool, ChatError> {
        let listening = self.lock()?.speech.is_listening();
        if listening {
            self.stop_listening()?;
        } else {
            self.start_listening()?;
        }
        Ok(!listening)
    }

    pub fn handle_speech_event(&self, event: SpeechEvent) -> Result<SpeechUpdate, ChatError> {
        let mut guard = self.lock()?;
        let state = &mut *guard;
        Ok(state.speech.apply(event, &mut state.conversation.input))
    }

    /// Apply events from a speech capability until its channel closes.
    pub async fn run_speech_events(
        &self,
        mut events: mpsc::Receiver<SpeechEvent>,
    ) -> Result<(), ChatError> {
        while let Some(event) = events.recv().await {
            self.handle_speech_event(event)?;
        }
        Ok(())
    }

    // =========================================================================
    // Observation
    // =========================================================================

    pub fn snapshot(&self) -> Result<WidgetSnapshot, ChatError> {
        let state = self.lock()?;
        let conversation = &state.conversation;
        Ok(WidgetSnapshot {
            transcript: conversation.session.transcript.clone(),
            session_id: conversation.session.session_id.clone(),
            identity: conversation.session.identity.clone(),
            input: conversation.input.clone(),
            error: conversation.error.clone(),
            notice: conversation.notice.clone(),
            active: state.live_activation().is_ok(),
            ready: state.ready,
            sending: conversation.is_sending(),
            listening: state.speech.is_listening(),
            interim: state.speech.interim().map(str::to_string),
            status: self.ticker.current(),
        })
    }

    /// Receiver of the rotating status line; `None` while idle.
    pub fn status_receiver(&self) -> watch::Receiver<Option<String>> {
        self.ticker.subscribe()
    }
}

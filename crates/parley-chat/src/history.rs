//! History hydration.
//!
//! Reconstructs the most relevant prior conversation for an identity by
//! walking an ordered list of sources until one yields a session:
//! 1. the server's latest conversation for the identity,
//! 2. the conversation named by the local session record,
//! 3. otherwise an empty, unbound session.
//!
//! Skip mode bypasses all sources and seeds an optional opening message.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use parley_client::ConversationService;
use parley_core::types::{Identity, Message, Session};
use parley_storage::SessionRecords;

use crate::error::ChatError;

/// Inline notice when a history source fails without a server-provided reason.
pub const HISTORY_FAILED_MESSAGE: &str = "Could not load previous conversation.";

/// Where a hydrated session came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HydrationTier {
    /// History was skipped on request.
    Skipped,
    /// Latest conversation reported by the server.
    ServerLatest,
    /// Conversation named by the local session record.
    PersistedRecord,
    /// Nothing found; fresh session.
    Empty,
}

/// Whether to load history on activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum HistoryMode {
    #[default]
    Resume,
    /// Ephemeral, context-scoped conversation with an optional opening message.
    Skip { opening_message: Option<String> },
}

/// Why a source produced no session.
#[derive(Debug)]
pub enum SourceFailure {
    /// The source has nothing for this identity. Not surfaced.
    Unavailable,
    /// The source failed; surfaced inline as a non-fatal notice.
    Failed(ChatError),
}

/// One fallback tier of history hydration.
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn tier(&self) -> HydrationTier;

    async fn fetch(&self, identity: &Identity) -> Result<Session, SourceFailure>;

    /// Record a session this source produced once the caller has accepted it.
    fn remember(&self, _session: &Session) {}
}

/// Outcome of a hydration run. Always usable; failures only add notices.
#[derive(Debug, Clone)]
pub struct Hydration {
    pub session: Session,
    pub tier: HydrationTier,
    pub notices: Vec<String>,
}

// =============================================================================
// Sources
// =============================================================================

/// Tier 2: ask the server for the identity's latest conversation.
///
/// An accepted session's id is written to the local record.
pub struct ServerLatestSource {
    service: Arc<dyn ConversationService>,
    records: SessionRecords,
}

impl ServerLatestSource {
    pub fn new(service: Arc<dyn ConversationService>, records: SessionRecords) -> Self {
        Self { service, records }
    }
}

#[async_trait]
impl HistorySource for ServerLatestSource {
    fn tier(&self) -> HydrationTier {
        HydrationTier::ServerLatest
    }

    async fn fetch(&self, identity: &Identity) -> Result<Session, SourceFailure> {
        let payload = match self.service.latest_for_user(identity).await {
            Ok(payload) => payload,
            // No conversation yet for this identity.
            Err(e) if e.status() == Some(404) => return Err(SourceFailure::Unavailable),
            Err(e) => return Err(SourceFailure::Failed(e.into())),
        };
        let chat_id = payload.chat_id.ok_or(SourceFailure::Unavailable)?;

        Ok(Session::hydrated(
            Some(identity.clone()),
            chat_id,
            payload.messages,
        ))
    }

    fn remember(&self, session: &Session) {
        let (Some(identity), Some(chat_id)) = (&session.identity, &session.session_id) else {
            return;
        };
        if let Err(e) = self.records.set(identity, chat_id) {
            warn!(identity = %identity, error = %e, "Failed to store session record");
        }
    }
}

/// Tier 3: load the conversation named by the local record.
///
/// The record is left untouched; it already names this session.
pub struct PersistedRecordSource {
    service: Arc<dyn ConversationService>,
    records: SessionRecords,
}

impl PersistedRecordSource {
    pub fn new(service: Arc<dyn ConversationService>, records: SessionRecords) -> Self {
        Self { service, records }
    }
}

#[async_trait]
impl HistorySource for PersistedRecordSource {
    fn tier(&self) -> HydrationTier {
        HydrationTier::PersistedRecord
    }

    async fn fetch(&self, identity: &Identity) -> Result<Session, SourceFailure> {
        let chat_id = match self.records.get(identity) {
            Ok(Some(chat_id)) => chat_id,
            Ok(None) => return Err(SourceFailure::Unavailable),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Ignoring unreadable session record");
                return Err(SourceFailure::Unavailable);
            }
        };

        let payload = self
            .service
            .fetch_chat(&chat_id)
            .await
            .map_err(|e| SourceFailure::Failed(e.into()))?;

        Ok(Session::hydrated(
            Some(identity.clone()),
            chat_id,
            payload.messages,
        ))
    }
}

// =============================================================================
// HistoryLoader
// =============================================================================

/// Runs the ordered fallback sources.
pub struct HistoryLoader {
    sources: Vec<Box<dyn HistorySource>>,
}

impl HistoryLoader {
    /// Server-latest, then persisted-record.
    pub fn standard(service: Arc<dyn ConversationService>, records: SessionRecords) -> Self {
        Self::with_sources(vec![
            Box::new(ServerLatestSource::new(
                Arc::clone(&service),
                records.clone(),
            )),
            Box::new(PersistedRecordSource::new(service, records)),
        ])
    }

    pub fn with_sources(sources: Vec<Box<dyn HistorySource>>) -> Self {
        Self { sources }
    }

    /// Hydrate a session. Never fails; the empty tier is a valid outcome.
    pub async fn load(&self, identity: Option<&Identity>, mode: &HistoryMode) -> Hydration {
        if let HistoryMode::Skip { opening_message } = mode {
            let mut session = Session::new(identity.cloned());
            if let Some(text) = opening_message.as_deref().filter(|t| !t.trim().is_empty()) {
                session.push(Message::assistant(text));
            }
            debug!("History skipped");
            return Hydration {
                session,
                tier: HydrationTier::Skipped,
                notices: Vec::new(),
            };
        }

        let Some(identity) = identity else {
            info!("No identity; starting without history");
            return Hydration {
                session: Session::new(None),
                tier: HydrationTier::Empty,
                notices: Vec::new(),
            };
        };

        let mut notices = Vec::new();
        for source in &self.sources {
            let tier = source.tier();
            match source.fetch(identity).await {
                Ok(session) => {
                    info!(
                        identity = %identity,
                        tier = ?tier,
                        messages = session.transcript.len(),
                        "History hydrated"
                    );
                    return Hydration {
                        session,
                        tier,
                        notices,
                    };
                }
                Err(SourceFailure::Unavailable) => {
                    debug!(identity = %identity, tier = ?tier, "History source had nothing");
                }
                Err(SourceFailure::Failed(e)) => {
                    warn!(identity = %identity, tier = ?tier, error = %e, "History source failed");
                    notices.push(failure_notice(&e));
                }
            }
        }

        info!(identity = %identity, "No prior conversation; starting fresh");
        Hydration {
            session: Session::new(Some(identity.clone())),
            tier: HydrationTier::Empty,
            notices,
        }
    }

    /// Let the source that produced `hydration` record it.
    ///
    /// Call only after the hydration has been applied to a live conversation.
    pub fn commit(&self, hydration: &Hydration) {
        if let Some(source) = self.sources.iter().find(|s| s.tier() == hydration.tier) {
            source.remember(&hydration.session);
        }
    }
}

fn failure_notice(error: &ChatError) -> String {
    match error {
        ChatError::Service(e) => match e.server_message() {
            Some(message) => format!("Could not load previous conversation: {}", message),
            None => HISTORY_FAILED_MESSAGE.to_string(),
        },
        _ => HISTORY_FAILED_MESSAGE.to_string(),
    }
}

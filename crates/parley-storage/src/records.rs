//! Per-identity session records.
//!
//! One entry per identity, keyed `<prefix><identity>`, holding only the last
//! known chat id. Message content is never written here.

use std::sync::Arc;

use tracing::debug;

use parley_core::error::ParleyError;
use parley_core::types::{Identity, SessionId};

use crate::kv::KeyValueStore;

/// Identity-keyed view over a `KeyValueStore`.
#[derive(Clone)]
pub struct SessionRecords {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl SessionRecords {
    pub fn new(store: Arc<dyn KeyValueStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Storage key for an identity.
    pub fn key_for(&self, identity: &Identity) -> String {
        format!("{}{}", self.prefix, identity)
    }

    /// Last known session id for `identity`. Blank values read as absent.
    pub fn get(&self, identity: &Identity) -> Result<Option<SessionId>, ParleyError> {
        let value = self.store.get(&self.key_for(identity))?;
        Ok(value
            .filter(|v| !v.trim().is_empty())
            .map(SessionId::new))
    }

    pub fn set(&self, identity: &Identity, session_id: &SessionId) -> Result<(), ParleyError> {
        self.store
            .set(&self.key_for(identity), session_id.as_str())?;
        debug!(identity = %identity, chat_id = %session_id, "Session record stored");
        Ok(())
    }

    /// Remove the record. Returns whether one existed.
    pub fn delete(&self, identity: &Identity) -> Result<bool, ParleyError> {
        self.store.delete(&self.key_for(identity))
    }
}

impl std::fmt::Debug for SessionRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRecords")
            .field("prefix", &self.prefix)
            .finish()
    }
}

//! Local session reset.

use tracing::{info, warn};

use parley_storage::SessionRecords;

use crate::state::ConversationState;

/// Discards the current session locally. Never contacts the service.
pub struct SessionResetter {
    records: SessionRecords,
}

impl SessionResetter {
    pub fn new(records: SessionRecords) -> Self {
        Self { records }
    }

    /// Clear the transcript, session id and inline error, and forget the
    /// persisted record for the current identity.
    ///
    /// The epoch is bumped so a reply still in flight cannot restore the
    /// discarded session. The exchange phase is left alone.
    pub fn reset(&self, state: &mut ConversationState) {
        let previous = state.session.session_id.take();
        state.session.clear();
        state.error = None;
        state.epoch = state.epoch.wrapping_add(1);

        if let Some(identity) = &state.session.identity {
            match self.records.delete(identity) {
                Ok(removed) => {
                    info!(identity = %identity, chat_id = ?previous, removed, "Session reset")
                }
                Err(e) => {
                    warn!(identity = %identity, error = %e, "Failed to delete session record")
                }
            }
        } else {
            info!(chat_id = ?previous, "Session reset");
        }
    }
}

//! Identity resolution.
//!
//! An explicit identity always wins. Otherwise the durable local user record
//! is consulted: the first record key that is present is parsed as JSON and
//! the first identifier field found in it is used.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use parley_core::config::IdentityConfig;
use parley_core::types::Identity;
use parley_storage::KeyValueStore;

/// Resolves the durable identifier of the current user.
pub struct IdentityResolver {
    store: Arc<dyn KeyValueStore>,
    record_keys: Vec<String>,
    id_fields: Vec<String>,
}

impl IdentityResolver {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &IdentityConfig) -> Self {
        Self {
            store,
            record_keys: config.record_keys.clone(),
            id_fields: config.id_fields.clone(),
        }
    }

    /// Resolve the identity for this activation.
    ///
    /// Returns `None` when nothing usable is found; callers then run in a
    /// historyless, non-persisting mode.
    pub fn resolve(&self, explicit: Option<&str>) -> Option<Identity> {
        if let Some(raw) = explicit {
            match Identity::new(raw) {
                Ok(identity) => return Some(identity),
                Err(_) => debug!("Blank explicit identity ignored"),
            }
        }
        self.from_record()
    }

    fn from_record(&self) -> Option<Identity> {
        for key in &self.record_keys {
            match self.store.get(key) {
                Ok(Some(raw)) => return self.extract(key, &raw),
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to read user record");
                    continue;
                }
            }
        }
        debug!("No user record found; identity unresolved");
        None
    }

    fn extract(&self, key: &str, raw: &str) -> Option<Identity> {
        let record: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Ignoring malformed user record");
                return None;
            }
        };

        for field in &self.id_fields {
            let candidate = match record.get(field) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => continue,
            };
            if let Ok(identity) = Identity::new(candidate) {
                debug!(key = %key, field = %field, "Identity resolved from user record");
                return Some(identity);
            }
        }

        warn!(key = %key, "User record carries no identifier");
        None
    }
}

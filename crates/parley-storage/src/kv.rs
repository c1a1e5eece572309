//! Key-value persistence port.
//!
//! The conversation widget only ever needs string values addressed by string
//! keys: the serialized user profile and one session record per identity.
//! `KeyValueStore` is the seam; SQLite backs it in the application and a
//! `HashMap` backs it in tests.

use std::collections::HashMap;
use std::sync::Mutex;

use parley_core::error::ParleyError;

/// Durable string-to-string storage.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Insert or overwrite the value stored under `key`.
    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError>;

    /// Remove `key`. Returns whether an entry existed.
    fn delete(&self, key: &str) -> Result<bool, ParleyError>;
}

/// `KeyValueStore` held in process memory.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given entries.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            entries: Mutex::new(map),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ParleyError> {
        self.entries
            .lock()
            .map_err(|e| ParleyError::Storage(format!("kv lock poisoned: {}", e)))
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ParleyError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        Ok(self.lock()?.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_contract() {
        let store = MemoryKeyValueStore::new();
        assert_eq!(store.get("missing").unwrap(), None);

        store.set("chatId_u1", "c1").unwrap();
        assert_eq!(store.get("chatId_u1").unwrap().as_deref(), Some("c1"));

        // Last writer wins.
        store.set("chatId_u1", "c2").unwrap();
        assert_eq!(store.get("chatId_u1").unwrap().as_deref(), Some("c2"));

        assert!(store.delete("chatId_u1").unwrap());
        assert!(!store.delete("chatId_u1").unwrap());
        assert_eq!(store.get("chatId_u1").unwrap(), None);
    }

    #[test]
    fn test_memory_store_with_entries() {
        let store = MemoryKeyValueStore::with_entries([("user", "{\"id\":\"u1\"}")]);
        assert_eq!(
            store.get("user").unwrap().as_deref(),
            Some("{\"id\":\"u1\"}")
        );
    }
}

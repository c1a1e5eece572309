//! parley storage crate - durable local records.
//!
//! Provides the key-value persistence port used for the user profile and
//! session records, a WAL-mode SQLite implementation of it, and an in-memory
//! implementation for tests and ephemeral runs.

pub mod kv;
pub mod records;
pub mod sqlite;

pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use records::SessionRecords;
pub use sqlite::SqliteKeyValueStore;

//! Backends - Key-Value Store and Object Store Adapters
//!
//! `TigerStyle`: Two narrow traits, one per storage model.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐   ┌──────────────────────────────────┐
//! │ KeyValueStore (Backend A)    │   │ ObjectStore (Backend B)          │
//! │ sync, string values, quota   │   │ async, open() -> Connection      │
//! └──────────────────────────────┘   │ one transaction per put          │
//!        ↑               ↑           └──────────────────────────────────┘
//! ┌──────┴──────┐ ┌──────┴──────┐           ↑                  ↑
//! │SimKeyValue  │ │FileKeyValue │   ┌───────┴──────┐  ┌────────┴───────┐
//! │  (testing)  │ │ (directory) │   │SimObjectStore│  │SqliteObjectStore│
//! └─────────────┘ └─────────────┘   │  (testing)   │  │   (sqlite)     │
//!                                   └──────────────┘  └────────────────┘
//! ```
//!
//! Object store connections are scoped: [`ObjectStore::open`] hands out a
//! connection value and dropping it releases the underlying handle, so every
//! exit path of a protocol operation closes what it opened.

mod error;
mod file;
mod sim;

#[cfg(feature = "sqlite")]
mod sqlite;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use error::{BackendError, BackendResult};
pub use file::FileKeyValueStore;
pub use sim::{SimKeyValueStore, SimObjectConnection, SimObjectStore};

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteObjectConnection, SqliteObjectStore};

// =============================================================================
// BackendId
// =============================================================================

/// Identifies which backend holds a generation.
///
/// The serialized names are part of the persisted layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendId {
    /// Backend A: synchronous quota-limited key-value store
    #[serde(rename = "localStorage")]
    KeyValue,
    /// Backend B: asynchronous transactional object store
    #[serde(rename = "indexedDB")]
    ObjectStore,
}

impl BackendId {
    /// Persisted name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KeyValue => "localStorage",
            Self::ObjectStore => "indexedDB",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Backend A
// =============================================================================

/// Synchronous string key-value store with a small quota.
///
/// Every call completes before returning; implementations must not block on
/// anything slower than local I/O.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. Returns `None` if the key is absent.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> BackendResult<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// # Errors
    /// Returns [`BackendError::QuotaExceeded`] if the write does not fit.
    fn set_item(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Remove a key. Removing an absent key is not an error.
    ///
    /// # Errors
    /// Returns an error if the store cannot be modified.
    fn remove_item(&self, key: &str) -> BackendResult<()>;

    /// All keys currently stored, in no particular order.
    ///
    /// # Errors
    /// Returns an error if the store cannot be read.
    fn keys(&self) -> BackendResult<Vec<String>>;
}

// =============================================================================
// Backend B
// =============================================================================

/// Asynchronous object store that hands out scoped connections.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Connection type; dropping it releases the backend handle.
    type Connection: ObjectStoreConnection;

    /// Open (creating if needed) the object store.
    ///
    /// # Errors
    /// Returns [`BackendError::Unavailable`] if the store cannot be opened.
    async fn open(&self) -> BackendResult<Self::Connection>;
}

/// An open object store. Entries are JSON objects keyed in-line by their
/// string `id` field.
#[async_trait]
pub trait ObjectStoreConnection: Send + Sync {
    /// Insert or replace one entry in its own transaction.
    ///
    /// # Errors
    /// Returns [`BackendError::InvalidKey`] if the entry has no string `id`,
    /// or [`BackendError::TransactionAborted`] if the transaction fails.
    async fn put(&self, entry: &serde_json::Value) -> BackendResult<()>;

    /// Read one entry by id in its own read transaction.
    ///
    /// # Errors
    /// Returns an error if the read transaction fails.
    async fn get(&self, id: &str) -> BackendResult<Option<serde_json::Value>>;

    /// Remove every entry in one transaction.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    async fn clear(&self) -> BackendResult<()>;

    /// Number of stored entries.
    ///
    /// # Errors
    /// Returns an error if the read transaction fails.
    async fn count(&self) -> BackendResult<usize>;
}

/// Extract the in-line key of an object store entry.
///
/// # Errors
/// Returns [`BackendError::InvalidKey`] if `id` is missing, not a string, or empty.
pub fn entry_id(entry: &serde_json::Value) -> BackendResult<&str> {
    match entry.get("id").and_then(serde_json::Value::as_str) {
        Some(id) if !id.is_empty() => Ok(id),
        Some(_) => Err(BackendError::invalid_key("entry id is empty")),
        None => Err(BackendError::invalid_key("entry has no string id field")),
    }
}

//! Simulated Backends - In-Memory Stores for Testing
//!
//! `TigerStyle`: Deterministic testing with fault injection.
//!
//! Both stores keep their data behind an `Arc`, so clones share one key
//! space the way every tab of a browser origin shares its storage.
//! Operation names handed to the fault injector:
//!
//! | Store | Operations |
//! |---|---|
//! | key-value | `kv_get`, `kv_set`, `kv_remove`, `kv_keys` |
//! | object | `object_open`, `object_put:{id}`, `object_get:{id}`, `object_clear`, `object_count` |

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::constants::KEY_VALUE_QUOTA_BYTES_DEFAULT;
use crate::dst::{DeterministicRng, FaultConfig, FaultInjector, FaultType, SimConfig};

use super::error::{BackendError, BackendResult};
use super::{entry_id, BackendId, KeyValueStore, ObjectStore, ObjectStoreConnection};

/// Map an injected fault to the error a real backend would raise.
fn fault_to_error(backend: BackendId, fault: FaultType, operation: &str, key: &str) -> BackendError {
    match fault {
        FaultType::StorageQuotaExceeded => BackendError::quota_exceeded(key, usize::MAX, 0),
        FaultType::TransactionAbort => {
            BackendError::transaction_aborted(key, format!("injected abort during {operation}"))
        }
        FaultType::BackendUnavailable => {
            BackendError::unavailable(backend, format!("injected during {operation}"))
        }
        other => BackendError::simulated_fault(format!("{other:?} during {operation}")),
    }
}

/// First half of `value`, cut on a char boundary.
fn garble(value: &str) -> String {
    let keep = value.chars().count() / 2;
    value.chars().take(keep).collect()
}

// =============================================================================
// SimKeyValueStore
// =============================================================================

/// In-memory quota-limited key-value store (Backend A) for testing.
///
/// Usage is counted as key bytes plus value bytes, mirroring how browsers
/// charge an origin for both.
#[derive(Debug, Clone)]
pub struct SimKeyValueStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    quota_bytes: usize,
    fault_injector: Arc<FaultInjector>,
    available: bool,
}

impl SimKeyValueStore {
    /// Create a store with the default quota and no faults.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let mut rng = DeterministicRng::new(config.seed());
        Self::with_fault_injector(Arc::new(FaultInjector::new(rng.fork())))
    }

    /// Create a store sharing a fault injector with a simulation.
    #[must_use]
    pub fn with_fault_injector(fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            quota_bytes: KEY_VALUE_QUOTA_BYTES_DEFAULT,
            fault_injector,
            available: true,
        }
    }

    /// A store whose every operation reports the API as missing.
    #[must_use]
    pub fn unavailable(config: SimConfig) -> Self {
        Self {
            available: false,
            ..Self::new(config)
        }
    }

    /// Set the quota in bytes.
    #[must_use]
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Add fault configuration.
    ///
    /// # Panics
    /// Panics if the fault injector is already shared.
    #[must_use]
    pub fn with_faults(mut self, config: FaultConfig) -> Self {
        Arc::get_mut(&mut self.fault_injector)
            .expect("cannot add faults after backend is shared")
            .register(config);
        self
    }

    /// Configured quota.
    #[must_use]
    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    /// Bytes currently charged against the quota.
    #[must_use]
    pub fn usage_bytes(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }

    /// Number of stored keys (for testing).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get fault injector for inspection.
    #[must_use]
    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.fault_injector
    }

    fn check(&self, operation: &str, key: &str) -> BackendResult<Option<FaultType>> {
        if !self.available {
            return Err(BackendError::unavailable(
                BackendId::KeyValue,
                "key-value storage API not present",
            ));
        }
        match self.fault_injector.should_inject(operation) {
            Some(FaultType::StorageCorruption) => Ok(Some(FaultType::StorageCorruption)),
            Some(fault) => Err(fault_to_error(BackendId::KeyValue, fault, operation, key)),
            None => Ok(None),
        }
    }
}

impl KeyValueStore for SimKeyValueStore {
    #[tracing::instrument(level = "trace", skip(self))]
    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        let fault = self.check("kv_get", key)?;

        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let value = entries.get(key).cloned();
        Ok(match fault {
            Some(FaultType::StorageCorruption) => value.map(|v| garble(&v)),
            _ => value,
        })
    }

    #[tracing::instrument(level = "trace", skip(self, value), fields(value_len = value.len()))]
    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        // Precondition
        if key.is_empty() {
            return Err(BackendError::invalid_key("key must not be empty"));
        }
        self.check("kv_set", key)?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let used: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
        let replaced = entries.get(key).map_or(0, |old| key.len() + old.len());
        let needed = used - replaced + key.len() + value.len();
        if needed > self.quota_bytes {
            return Err(BackendError::quota_exceeded(key, needed, self.quota_bytes));
        }

        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        self.check("kv_remove", key)?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        self.check("kv_keys", "")?;

        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }
}

// =============================================================================
// SimObjectStore
// =============================================================================

/// In-memory transactional object store (Backend B) for testing.
///
/// Each `put` is atomic on its own; nothing spans two puts.
#[derive(Debug, Clone)]
pub struct SimObjectStore {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
    fault_injector: Arc<FaultInjector>,
    open_connections: Arc<AtomicUsize>,
    available: bool,
}

impl SimObjectStore {
    /// Create an empty store with no faults.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        let mut rng = DeterministicRng::new(config.seed());
        Self::with_fault_injector(Arc::new(FaultInjector::new(rng.fork())))
    }

    /// Create a store sharing a fault injector with a simulation.
    #[must_use]
    pub fn with_fault_injector(fault_injector: Arc<FaultInjector>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            fault_injector,
            open_connections: Arc::new(AtomicUsize::new(0)),
            available: true,
        }
    }

    /// A store that can never be opened.
    #[must_use]
    pub fn unavailable(config: SimConfig) -> Self {
        Self {
            available: false,
            ..Self::new(config)
        }
    }

    /// Add fault configuration.
    ///
    /// # Panics
    /// Panics if the fault injector is already shared.
    #[must_use]
    pub fn with_faults(mut self, config: FaultConfig) -> Self {
        Arc::get_mut(&mut self.fault_injector)
            .expect("cannot add faults after backend is shared")
            .register(config);
        self
    }

    /// Connections currently open. Zero whenever no operation is running.
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::SeqCst)
    }

    /// Ids of all stored entries, sorted (for testing).
    #[must_use]
    pub fn entry_ids(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Number of stored entries (for testing).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get fault injector for inspection.
    #[must_use]
    pub fn fault_injector(&self) -> &Arc<FaultInjector> {
        &self.fault_injector
    }
}

#[async_trait]
impl ObjectStore for SimObjectStore {
    type Connection = SimObjectConnection;

    async fn open(&self) -> BackendResult<SimObjectConnection> {
        if !self.available {
            return Err(BackendError::unavailable(
                BackendId::ObjectStore,
                "object store API not present",
            ));
        }
        if let Some(fault) = self.fault_injector.should_inject("object_open") {
            return Err(fault_to_error(BackendId::ObjectStore, fault, "object_open", ""));
        }

        self.open_connections.fetch_add(1, Ordering::SeqCst);
        Ok(SimObjectConnection {
            entries: Arc::clone(&self.entries),
            fault_injector: Arc::clone(&self.fault_injector),
            open_connections: Arc::clone(&self.open_connections),
        })
    }
}

/// Open connection to a [`SimObjectStore`]; closes on drop.
#[derive(Debug)]
pub struct SimObjectConnection {
    entries: Arc<RwLock<BTreeMap<String, Value>>>,
    fault_injector: Arc<FaultInjector>,
    open_connections: Arc<AtomicUsize>,
}

impl SimObjectConnection {
    /// Entry operations are reported as `{operation}:{id}` so a filter can
    /// target a single batch.
    fn check(&self, operation: &str, id: &str) -> BackendResult<Option<FaultType>> {
        let scoped;
        let name = if id.is_empty() {
            operation
        } else {
            scoped = format!("{operation}:{id}");
            &scoped
        };
        match self.fault_injector.should_inject(name) {
            Some(FaultType::StorageCorruption) => Ok(Some(FaultType::StorageCorruption)),
            Some(FaultType::StorageWriteFail | FaultType::StorageReadFail) => Err(
                BackendError::transaction_aborted(id, format!("injected failure during {operation}")),
            ),
            Some(fault) => Err(fault_to_error(BackendId::ObjectStore, fault, operation, id)),
            None => Ok(None),
        }
    }
}

impl Drop for SimObjectConnection {
    fn drop(&mut self) {
        self.open_connections.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStoreConnection for SimObjectConnection {
    async fn put(&self, entry: &Value) -> BackendResult<()> {
        let id = entry_id(entry)?;
        self.check("object_put", id)?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), entry.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> BackendResult<Option<Value>> {
        let fault = self.check("object_get", id)?;

        let value = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        Ok(match fault {
            Some(FaultType::StorageCorruption) => {
                value.map(|v| Value::String(garble(&v.to_string())))
            }
            _ => value,
        })
    }

    async fn clear(&self) -> BackendResult<()> {
        self.check("object_clear", "")?;

        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    async fn count(&self) -> BackendResult<usize> {
        self.check("object_count", "")?;

        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

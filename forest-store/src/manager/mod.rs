//! Storage Manager - Adaptive Two-Backend Persistence
//!
//! `TigerStyle`: Protocol errors stop at this boundary. Callers see a
//! [`StorageResult`] or an `Option`, never a raw backend error.
//!
//! # Protocols
//!
//! | Operation | Module |
//! |---|---|
//! | [`StorageManager::save`] | `write` |
//! | [`StorageManager::load`] | `read` |
//! | [`StorageManager::clear_all`] | `clear` |
//! | [`StorageManager::storage_info`] | `info` |
//!
//! A generation lives on exactly one backend. Backend A writes its batch
//! info last, so the info key doubles as a commit marker; Backend B writes
//! it first and wipes the store if any batch fails.
//!
//! The manager holds no lock. Callers run at most one protocol operation at
//! a time.

mod clear;
mod info;
mod read;
mod write;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendId, KeyValueStore, ObjectStore};
use crate::codec::Batch;
use crate::config::StoreConfig;
use crate::constants::{BATCH_INFO_BATCHES_COUNT_MAX, BATCH_SIZE_COUNT_MAX};
use crate::dst::SimClock;
use crate::record::Record;

pub use info::{KeyValueInfo, StorageInfo};

// =============================================================================
// Persisted Types
// =============================================================================

/// Describes one stored generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    /// Number of batch entries written
    pub total_batches: usize,
    /// Number of records across all batches
    pub total_count: usize,
    /// Milliseconds since the Unix epoch at save time
    pub timestamp: u64,
    /// Backend holding the generation
    pub storage_type: BackendId,
}

impl BatchInfo {
    /// Check that the declared counts could have come from a save.
    ///
    /// Stored info that parses but fails this check is malformed and must
    /// not drive any loop or allocation.
    ///
    /// # Errors
    /// Returns a description of the first inconsistency found.
    pub fn validate(&self) -> Result<(), String> {
        if self.total_batches > BATCH_INFO_BATCHES_COUNT_MAX {
            return Err(format!(
                "totalBatches {} exceeds {BATCH_INFO_BATCHES_COUNT_MAX}",
                self.total_batches
            ));
        }
        if self.total_count == 0 {
            if self.total_batches != 0 {
                return Err(format!("{} batches declared for 0 records", self.total_batches));
            }
            return Ok(());
        }
        if self.total_batches == 0 || self.total_batches > self.total_count {
            return Err(format!(
                "{} batches cannot hold {} records",
                self.total_batches, self.total_count
            ));
        }
        let capacity = self.total_batches.saturating_mul(BATCH_SIZE_COUNT_MAX);
        if self.total_count > capacity {
            return Err(format!(
                "totalCount {} exceeds {capacity} for {} batches",
                self.total_count, self.total_batches
            ));
        }
        Ok(())
    }
}

/// Backend B batch info entry, keyed in-line.
#[derive(Debug, Serialize, Deserialize)]
struct ObjectInfoEntry {
    id: String,
    #[serde(flatten)]
    info: BatchInfo,
}

/// Backend B batch entry.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectBatchEntry {
    id: String,
    data: Batch,
    batch_index: usize,
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of [`StorageManager::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageResult {
    /// Whether a complete generation was written
    pub success: bool,
    /// Backend that holds the generation (on success)
    pub storage_type: Option<BackendId>,
    /// Batches written (on success)
    pub batch_count: usize,
    /// Human-readable failure (on failure)
    pub error: Option<String>,
}

impl StorageResult {
    /// A successful save.
    #[must_use]
    pub fn stored(backend: BackendId, batch_count: usize) -> Self {
        Self {
            success: true,
            storage_type: Some(backend),
            batch_count,
            error: None,
        }
    }

    /// A failed save.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            storage_type: None,
            batch_count: 0,
            error: Some(error.into()),
        }
    }
}

/// Outcome of a successful [`StorageManager::load`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult {
    /// Reconstructed records, in saved order
    pub records: Vec<Record>,
    /// Backend the generation came from
    pub storage_type: BackendId,
    /// Batch info as stored
    pub info: BatchInfo,
}

// =============================================================================
// TimeSource
// =============================================================================

/// Where batch info timestamps come from.
#[derive(Debug, Clone, Default)]
pub enum TimeSource {
    /// Wall clock
    #[default]
    System,
    /// Simulated clock (deterministic tests)
    Simulated(SimClock),
}

impl TimeSource {
    /// Current time in milliseconds since the Unix epoch.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        match self {
            Self::System => u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0),
            Self::Simulated(clock) => clock.now_ms(),
        }
    }
}

// =============================================================================
// StorageManager
// =============================================================================

/// Persists record sequences across a key-value store and an object store.
///
/// # Example
///
/// ```rust
/// use forest_store::dst::{SimConfig, Simulation};
/// use forest_store::{BackendId, NoProgress, Record, RecordMeta};
///
/// # tokio_test::block_on(async {
/// let env = Simulation::new(SimConfig::with_seed(7)).build();
/// let manager = env.manager();
///
/// let records = vec![Record::new(RecordMeta::new("r0", "Sheet1", 0)).with_field("area", 1.5)];
/// let result = manager.save(&records, &NoProgress).await;
/// assert_eq!(result.storage_type, Some(BackendId::KeyValue));
///
/// let loaded = manager.load().await.unwrap();
/// assert_eq!(loaded.records, records);
/// # });
/// ```
#[derive(Debug)]
pub struct StorageManager<K, O> {
    kv: K,
    objects: O,
    config: StoreConfig,
    time: TimeSource,
}

impl<K: KeyValueStore, O: ObjectStore> StorageManager<K, O> {
    /// Create a manager with the default configuration.
    #[must_use]
    pub fn new(kv: K, objects: O) -> Self {
        Self {
            kv,
            objects,
            config: StoreConfig::default(),
            time: TimeSource::System,
        }
    }

    /// Replace the configuration.
    ///
    /// # Panics
    /// Panics if `config` fails [`StoreConfig::validate`].
    #[must_use]
    pub fn with_config(mut self, config: StoreConfig) -> Self {
        // Precondition
        if let Err(e) = config.validate() {
            panic!("invalid store config: {e}");
        }
        self.config = config;
        self
    }

    /// Replace the time source.
    #[must_use]
    pub fn with_time_source(mut self, time: TimeSource) -> Self {
        self.time = time;
        self
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Backend A handle.
    #[must_use]
    pub fn key_value(&self) -> &K {
        &self.kv
    }

    /// Backend B handle.
    #[must_use]
    pub fn object_store(&self) -> &O {
        &self.objects
    }

    fn batch_info(&self, total_batches: usize, total_count: usize, backend: BackendId) -> BatchInfo {
        BatchInfo {
            total_batches,
            total_count,
            timestamp: self.time.now_ms(),
            storage_type: backend,
        }
    }

    /// Backend A batch info if it is present, parses and names Backend A.
    /// Also returns the raw value length for diagnostics.
    fn key_value_info(&self) -> Option<(BatchInfo, usize)> {
        let key = &self.config.key_layout.info_key;
        let text = match self.kv.get_item(key) {
            Ok(Some(text)) => text,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cannot read key-value batch info");
                return None;
            }
        };

        match serde_json::from_str::<BatchInfo>(&text) {
            Ok(info) if info.storage_type != BackendId::KeyValue => {
                tracing::debug!(storage_type = %info.storage_type, "key-value batch info names another backend");
                None
            }
            Ok(info) => match info.validate() {
                Ok(()) => Some((info, text.len())),
                Err(reason) => {
                    tracing::warn!(key = %key, reason = %reason, "inconsistent key-value batch info");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "malformed key-value batch info");
                None
            }
        }
    }

    /// Backend B batch info if it is present, parses and names Backend B.
    async fn object_store_info(
        &self,
        conn: &O::Connection,
    ) -> crate::backend::BackendResult<Option<BatchInfo>> {
        use crate::backend::ObjectStoreConnection;

        let id = &self.config.key_layout.object_info_id;
        let value = match conn.get(id).await {
            Ok(Some(value)) => value,
            Ok(None) => return Ok(None),
            Err(e @ BackendError::MalformedStoredData { .. }) => {
                tracing::warn!(id = %id, error = %e, "malformed object store batch info");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_value::<ObjectInfoEntry>(value) {
            Ok(entry) if entry.info.storage_type != BackendId::ObjectStore => {
                tracing::debug!(storage_type = %entry.info.storage_type, "object store batch info names another backend");
                Ok(None)
            }
            Ok(entry) => match entry.info.validate() {
                Ok(()) => Ok(Some(entry.info)),
                Err(reason) => {
                    tracing::warn!(id = %id, reason = %reason, "inconsistent object store batch info");
                    Ok(None)
                }
            },
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "malformed object store batch info");
                Ok(None)
            }
        }
    }

    fn should_yield(&self, batch_index: usize) -> bool {
        batch_index % self.config.yield_every_batches.get() == 0
    }

    /// Let other tasks run.
    async fn pause(&self) {
        if self.config.yield_duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.config.yield_duration).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_batch_info_wire_shape() {
        let info = BatchInfo {
            total_batches: 2,
            total_count: 1500,
            timestamp: 1_700_000_000_000,
            storage_type: BackendId::KeyValue,
        };

        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({
                "totalBatches": 2,
                "totalCount": 1500,
                "timestamp": 1_700_000_000_000u64,
                "storageType": "localStorage"
            })
        );
    }

    #[test]
    fn test_object_entries_wire_shape() {
        let entry = ObjectInfoEntry {
            id: "batch_info".to_string(),
            info: BatchInfo {
                total_batches: 1,
                total_count: 0,
                timestamp: 5,
                storage_type: BackendId::ObjectStore,
            },
        };
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({
                "id": "batch_info",
                "totalBatches": 1,
                "totalCount": 0,
                "timestamp": 5,
                "storageType": "indexedDB"
            })
        );

        let batch = ObjectBatchEntry {
            id: "batch_3".to_string(),
            data: Vec::new(),
            batch_index: 3,
        };
        assert_eq!(
            serde_json::to_value(&batch).unwrap(),
            json!({"id": "batch_3", "data": [], "batchIndex": 3})
        );
    }

    #[test]
    fn test_batch_info_validate() {
        let info = |total_batches, total_count| BatchInfo {
            total_batches,
            total_count,
            timestamp: 0,
            storage_type: BackendId::KeyValue,
        };

        assert!(info(0, 0).validate().is_ok());
        assert!(info(3, 2500).validate().is_ok());
        assert!(info(1, 1).validate().is_ok());

        assert!(info(1, 0).validate().is_err());
        assert!(info(0, 5).validate().is_err());
        assert!(info(6, 5).validate().is_err());
        assert!(info(1, usize::MAX).validate().is_err());
        assert!(info(usize::MAX, usize::MAX).validate().is_err());
        assert!(info(BATCH_INFO_BATCHES_COUNT_MAX + 1, usize::MAX).validate().is_err());
    }

    #[test]
    fn test_storage_result_constructors() {
        let ok = StorageResult::stored(BackendId::ObjectStore, 4);
        assert!(ok.success);
        assert_eq!(ok.batch_count, 4);
        assert!(ok.error.is_none());

        let failed = StorageResult::failed("both backends failed");
        assert!(!failed.success);
        assert_eq!(failed.storage_type, None);
        assert_eq!(failed.error.as_deref(), Some("both backends failed"));
    }

    #[test]
    fn test_simulated_time_source() {
        let clock = SimClock::at_ms(42);
        let time = TimeSource::Simulated(clock.clone());
        clock.advance_ms(8);
        assert_eq!(time.now_ms(), 50);
    }
}

//! Storage diagnostics.

use super::{BatchInfo, StorageManager};
use crate::backend::{BackendId, KeyValueStore, ObjectStore};
use crate::constants::BYTES_PER_MIB;
use crate::record::Record;
use crate::selector;

/// Backend A generation summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValueInfo {
    /// Stored batch info
    pub info: BatchInfo,
    /// Bytes of batch info plus every present batch value
    pub size_bytes: usize,
}

impl KeyValueInfo {
    /// Size in MiB.
    #[must_use]
    pub fn size_mib(&self) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let mib = self.size_bytes as f64 / BYTES_PER_MIB as f64;
        mib
    }
}

/// What each backend currently holds.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StorageInfo {
    /// Valid Backend A generation, if any
    pub key_value: Option<KeyValueInfo>,
    /// Valid Backend B generation, if any
    pub object_store: Option<BatchInfo>,
    /// Backend a load would read from
    pub current: Option<BackendId>,
}

impl<K: KeyValueStore, O: ObjectStore> StorageManager<K, O> {
    /// Inspect both backends without loading records.
    #[tracing::instrument(skip(self))]
    pub async fn storage_info(&self) -> StorageInfo {
        let key_value = self.key_value_storage_info();
        let object_store = self.object_storage_info().await;

        let current = if key_value.is_some() {
            Some(BackendId::KeyValue)
        } else if object_store.is_some() {
            Some(BackendId::ObjectStore)
        } else {
            None
        };

        StorageInfo {
            key_value,
            object_store,
            current,
        }
    }

    /// JSON size of `records` in bytes, as the selector measures it.
    #[must_use]
    pub fn estimate_size(&self, records: &[Record]) -> usize {
        selector::estimate_size(records)
    }

    fn key_value_storage_info(&self) -> Option<KeyValueInfo> {
        let (info, info_len) = self.key_value_info()?;
        let layout = &self.config.key_layout;

        let mut size_bytes = info_len;
        for index in 0..info.total_batches {
            match self.kv.get_item(&layout.batch_key(index)) {
                Ok(Some(value)) => size_bytes += value.len(),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(index, error = %e, "cannot size key-value batch");
                    return None;
                }
            }
        }

        Some(KeyValueInfo { info, size_bytes })
    }

    async fn object_storage_info(&self) -> Option<BatchInfo> {
        let conn = match self.objects.open().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(error = %e, "object store not available for info");
                return None;
            }
        };

        match self.object_store_info(&conn).await {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read object store batch info");
                None
            }
        }
    }
}

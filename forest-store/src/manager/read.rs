//! Read protocol.

use super::{BatchInfo, LoadResult, ObjectBatchEntry, StorageManager};
use crate::backend::{
    BackendError, BackendId, BackendResult, KeyValueStore, ObjectStore, ObjectStoreConnection,
};
use crate::codec::{self, Batch};
use crate::config::GapPolicy;
use crate::record::Record;

/// Why a batch could not be used.
enum Gap {
    Missing,
    Malformed(String),
}

impl<K: KeyValueStore, O: ObjectStore> StorageManager<K, O> {
    /// Reconstruct the stored generation, Backend A first.
    ///
    /// Returns `None` if neither backend holds a valid generation. Backend
    /// errors are logged, not returned.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> Option<LoadResult> {
        if let Some(loaded) = self.load_from_key_value() {
            return Some(loaded);
        }

        match self.load_from_object_store().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(error = %e, "object store load failed");
                None
            }
        }
    }

    fn load_from_key_value(&self) -> Option<LoadResult> {
        let (info, _) = self.key_value_info()?;
        let layout = &self.config.key_layout;

        let mut records = Vec::new();
        for index in 0..info.total_batches {
            let key = layout.batch_key(index);
            let batch = match self.kv.get_item(&key) {
                Ok(Some(text)) => {
                    serde_json::from_str::<Batch>(&text).map_err(|e| Gap::Malformed(e.to_string()))
                }
                Ok(None) => Err(Gap::Missing),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "cannot read key-value batch");
                    return None;
                }
            };

            match batch {
                Ok(batch) => records.extend(batch),
                Err(gap) => {
                    if !self.tolerate_gap(&key, &gap) {
                        return None;
                    }
                }
            }
        }

        if records.is_empty() && info.total_count > 0 {
            tracing::debug!("key-value generation yielded no records, probing object store");
            return None;
        }
        Some(finish(records, info, BackendId::KeyValue))
    }

    async fn load_from_object_store(&self) -> BackendResult<Option<LoadResult>> {
        let conn = self.objects.open().await?;
        let Some(info) = self.object_store_info(&conn).await? else {
            return Ok(None);
        };
        let layout = &self.config.key_layout;

        let mut batches = Vec::new();
        for index in 0..info.total_batches {
            let id = layout.object_batch_id(index);
            let batch = match conn.get(&id).await {
                Ok(Some(value)) => serde_json::from_value::<ObjectBatchEntry>(value)
                    .map(|entry| entry.data)
                    .map_err(|e| Gap::Malformed(e.to_string())),
                Ok(None) => Err(Gap::Missing),
                Err(BackendError::MalformedStoredData { reason, .. }) => {
                    Err(Gap::Malformed(reason))
                }
                Err(e) => return Err(e),
            };

            match batch {
                Ok(batch) => batches.push((index, batch)),
                Err(gap) => {
                    if !self.tolerate_gap(&id, &gap) {
                        return Ok(None);
                    }
                }
            }
        }

        let records = codec::join_indexed(batches);
        Ok(Some(finish(records, info, BackendId::ObjectStore)))
    }

    /// Log a gap; `true` if the load may continue.
    fn tolerate_gap(&self, key: &str, gap: &Gap) -> bool {
        let policy = self.config.gap_policy;
        match gap {
            Gap::Missing => tracing::warn!(key, ?policy, "batch missing"),
            Gap::Malformed(reason) => tracing::warn!(key, ?policy, reason = %reason, "batch malformed"),
        }
        policy == GapPolicy::Skip
    }
}

fn finish(records: Vec<Record>, info: BatchInfo, backend: BackendId) -> LoadResult {
    if records.len() != info.total_count {
        tracing::warn!(
            expected = info.total_count,
            actual = records.len(),
            backend = %backend,
            "record count differs from batch info"
        );
    }
    tracing::info!(records = records.len(), backend = %backend, "generation loaded");

    LoadResult {
        records,
        storage_type: backend,
        info,
    }
}

//! Write protocol.

use serde_json::Value;

use super::{ObjectBatchEntry, ObjectInfoEntry, StorageManager, StorageResult};
use crate::backend::{
    BackendError, BackendId, BackendResult, KeyValueStore, ObjectStore, ObjectStoreConnection,
};
use crate::codec::{self, Batch};
use crate::constants::{PROGRESS_PERCENT_COMPLETE, PROGRESS_PERCENT_UNCOMMITTED_MAX};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::record::Record;
use crate::selector;

impl<K: KeyValueStore, O: ObjectStore> StorageManager<K, O> {
    /// Replace any stored generation with `records`.
    ///
    /// Payloads under the selector threshold go to Backend A; if Backend A
    /// rejects any write the save starts over on Backend B. Progress is
    /// reported through `progress`, never decreasing, ending at exactly 100
    /// on success.
    #[tracing::instrument(skip(self, records, progress), fields(record_count = records.len()))]
    pub async fn save(&self, records: &[Record], progress: &dyn ProgressSink) -> StorageResult {
        self.clear_all().await;

        let mut tracker = ProgressTracker::new(progress);
        let mut fallback_reason = None;

        if selector::choose_backend(records, self.config.threshold_bytes) == BackendId::KeyValue {
            match self.save_to_key_value(records, &mut tracker).await {
                Ok(batches) => {
                    tracker.complete();
                    tracing::info!(batches, "generation saved to key-value store");
                    return StorageResult::stored(BackendId::KeyValue, batches);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "key-value save failed, falling back to object store");
                    fallback_reason = Some(e);
                }
            }
        }

        match self.save_to_object_store(records, &mut tracker).await {
            Ok(batches) => {
                tracker.complete();
                tracing::info!(batches, "generation saved to object store");
                StorageResult::stored(BackendId::ObjectStore, batches)
            }
            Err(e) => {
                tracing::error!(error = %e, "object store save failed");
                let message = match fallback_reason {
                    Some(first) => format!("key-value store: {first}; object store: {e}"),
                    None => format!("object store: {e}"),
                };
                StorageResult::failed(message)
            }
        }
    }

    /// Write every batch, then the batch info. On error the batches written
    /// so far are removed. Progress stays below 100 until the info is
    /// written.
    async fn save_to_key_value(
        &self,
        records: &[Record],
        tracker: &mut ProgressTracker<'_>,
    ) -> BackendResult<usize> {
        let batches = codec::split(records, self.config.kv_batch_size);
        tracker.begin_stage(PROGRESS_PERCENT_UNCOMMITTED_MAX);
        let mut written = Vec::with_capacity(batches.len());

        let result = self
            .write_key_value_generation(&batches, records.len(), &mut written, tracker)
            .await;

        if result.is_err() {
            for key in &written {
                if let Err(e) = self.kv.remove_item(key) {
                    tracing::warn!(key = %key, error = %e, "cannot remove partial key-value batch");
                }
            }
        }
        result
    }

    async fn write_key_value_generation(
        &self,
        batches: &[Batch],
        total_count: usize,
        written: &mut Vec<String>,
        tracker: &mut ProgressTracker<'_>,
    ) -> BackendResult<usize> {
        let layout = &self.config.key_layout;
        let total = batches.len();

        for (index, batch) in batches.iter().enumerate() {
            let key = layout.batch_key(index);
            let value = serde_json::to_string(batch)?;
            self.kv.set_item(&key, &value)?;
            written.push(key);

            tracker.batch_done(index + 1, total);
            if self.should_yield(index) {
                self.pause().await;
            }
        }

        // Commit marker
        let info = self.batch_info(total, total_count, BackendId::KeyValue);
        self.kv
            .set_item(&layout.info_key, &serde_json::to_string(&info)?)?;

        // Postcondition
        debug_assert_eq!(written.len(), total);
        Ok(total)
    }

    /// Clear the store, write the batch info, then one transaction per
    /// batch. On error the store is cleared again.
    async fn save_to_object_store(
        &self,
        records: &[Record],
        tracker: &mut ProgressTracker<'_>,
    ) -> BackendResult<usize> {
        tracker.begin_stage(PROGRESS_PERCENT_COMPLETE);
        let conn = self.objects.open().await?;
        conn.clear().await?;

        let result = self.write_object_generation(&conn, records, tracker).await;

        if result.is_err() {
            if let Err(e) = conn.clear().await {
                tracing::warn!(error = %e, "cannot clear object store after failed save");
            }
        }
        result
    }

    async fn write_object_generation(
        &self,
        conn: &O::Connection,
        records: &[Record],
        tracker: &mut ProgressTracker<'_>,
    ) -> BackendResult<usize> {
        let layout = &self.config.key_layout;
        let batches = codec::split(records, self.config.object_batch_size);
        let total = batches.len();

        let info = ObjectInfoEntry {
            id: layout.object_info_id.clone(),
            info: self.batch_info(total, records.len(), BackendId::ObjectStore),
        };
        self.put_with_retry(conn, &serde_json::to_value(&info)?)
            .await?;

        for (index, data) in batches.into_iter().enumerate() {
            let entry = ObjectBatchEntry {
                id: layout.object_batch_id(index),
                data,
                batch_index: index,
            };
            self.put_with_retry(conn, &serde_json::to_value(&entry)?)
                .await?;

            tracker.batch_done(index + 1, total);
            if self.should_yield(index) {
                self.pause().await;
            }
        }

        Ok(total)
    }

    /// Put one entry, retrying transient failures with capped exponential
    /// backoff.
    async fn put_with_retry(&self, conn: &O::Connection, entry: &Value) -> BackendResult<()> {
        let mut attempt = 0u32;
        loop {
            match conn.put(entry).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.retry_count_max => {
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "object store put failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(exhausted(e, attempt)),
            }
        }
    }
}

fn exhausted(err: BackendError, attempts: u32) -> BackendError {
    if attempts == 0 {
        return err;
    }
    match err {
        BackendError::TransactionAborted { id, reason } => BackendError::TransactionAborted {
            id,
            reason: format!("{reason} (after {attempts} retries)"),
        },
        other => other,
    }
}

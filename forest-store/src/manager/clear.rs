//! Clear protocol.

use super::{BatchInfo, StorageManager};
use crate::backend::{BackendError, BackendResult, KeyValueStore, ObjectStore, ObjectStoreConnection};

impl<K: KeyValueStore, O: ObjectStore> StorageManager<K, O> {
    /// Remove every stored generation from both backends.
    ///
    /// Never fails; problems are logged and the remaining steps still run.
    /// Safe to call repeatedly.
    #[tracing::instrument(skip(self))]
    pub async fn clear_all(&self) {
        self.clear_key_value();

        if let Err(e) = self.clear_object_store().await {
            tracing::warn!(error = %e, "cannot clear object store");
        }
    }

    fn clear_key_value(&self) {
        let layout = &self.config.key_layout;

        let batches = match self.kv.get_item(&layout.info_key) {
            Ok(Some(text)) => match serde_json::from_str::<BatchInfo>(&text) {
                Ok(info) => match info.validate() {
                    Ok(()) => info.total_batches,
                    Err(reason) => {
                        tracing::warn!(
                            reason = %reason,
                            "inconsistent batch info, clearing default batch range"
                        );
                        self.config.legacy_clear_batches
                    }
                },
                Err(e) => {
                    tracing::debug!(error = %e, "unreadable batch info, clearing default batch range");
                    self.config.legacy_clear_batches
                }
            },
            Ok(None) => self.config.legacy_clear_batches,
            Err(e @ BackendError::Unavailable { .. }) => {
                tracing::warn!(error = %e, "key-value store unavailable, skipping clear");
                return;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot read batch info, clearing default batch range");
                self.config.legacy_clear_batches
            }
        };

        let keys = (0..batches)
            .map(|index| layout.batch_key(index))
            .chain([layout.legacy_single_key.clone(), layout.info_key.clone()]);

        let mut failures = 0usize;
        for key in keys {
            if let Err(e) = self.kv.remove_item(&key) {
                failures += 1;
                tracing::warn!(key = %key, error = %e, "cannot remove key");
            }
        }
        tracing::debug!(batches, failures, "key-value store cleared");
    }

    async fn clear_object_store(&self) -> BackendResult<()> {
        let conn = self.objects.open().await?;
        conn.clear().await
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::KeyValueStore;
    use crate::dst::{SimConfig, Simulation};

    #[tokio::test]
    async fn test_clear_removes_legacy_layouts() {
        let env = Simulation::new(SimConfig::with_seed(5)).build();
        env.kv.set_item("forest_data_single", "[]").unwrap();
        env.kv.set_item("forest_data_batch_42", "[]").unwrap();
        env.kv.set_item("unrelated", "keep").unwrap();

        env.manager().clear_all().await;

        assert_eq!(env.kv.keys().unwrap(), vec!["unrelated".to_string()]);
    }

    #[tokio::test]
    async fn test_clear_with_malformed_info() {
        let env = Simulation::new(SimConfig::with_seed(5)).build();
        env.kv.set_item("forest_data_batches", "{not json").unwrap();
        env.kv.set_item("forest_data_batch_0", "[]").unwrap();

        env.manager().clear_all().await;

        assert!(env.kv.is_empty());
    }

    #[tokio::test]
    async fn test_clear_with_oversized_batch_count() {
        let env = Simulation::new(SimConfig::with_seed(5)).build();
        env.kv
            .set_item(
                "forest_data_batches",
                &format!(
                    r#"{{"totalBatches":{},"totalCount":{},"timestamp":0,"storageType":"localStorage"}}"#,
                    usize::MAX,
                    usize::MAX
                ),
            )
            .unwrap();
        env.kv.set_item("forest_data_batch_3", "[]").unwrap();

        env.manager().clear_all().await;

        assert!(env.kv.is_empty());
    }
}

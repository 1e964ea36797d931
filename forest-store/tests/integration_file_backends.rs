//! Integration tests for the persistent backends.
//!
//! These run the full save/load/clear protocols against real files.

use forest_store::dst::SimConfig;
use forest_store::{
    BackendId, FileKeyValueStore, KeyValueStore, NoProgress, Record, RecordMeta, SimObjectStore,
    StorageManager, StoreConfig,
};
use tempfile::TempDir;

fn records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new(RecordMeta::for_sheet_row(1, "更新", i as u64))
                .with_field("小班号", format!("{:03}", i % 120))
                .with_field("更新年度", 2020 + (i % 5) as u64)
        })
        .collect()
}

fn config() -> StoreConfig {
    StoreConfig::default()
        .with_kv_batch_size(100)
        .with_yield_duration_ms(0)
}

#[tokio::test]
async fn test_file_store_round_trip_survives_reopen() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let saved = records(450);

    {
        let kv = FileKeyValueStore::open(dir.path())?;
        let manager = StorageManager::new(kv, SimObjectStore::new(SimConfig::with_seed(1)))
            .with_config(config());
        let result = manager.save(&saved, &NoProgress).await;
        assert_eq!(result.storage_type, Some(BackendId::KeyValue));
        assert_eq!(result.batch_count, 5);
    }

    let kv = FileKeyValueStore::open(dir.path())?;
    let manager = StorageManager::new(kv, SimObjectStore::new(SimConfig::with_seed(2)))
        .with_config(config());
    let loaded = manager.load().await.expect("generation on disk");
    assert_eq!(loaded.records, saved);

    manager.clear_all().await;
    assert!(manager.key_value().keys()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_file_store_quota_falls_back() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let kv = FileKeyValueStore::open(dir.path())?.with_quota(4 * 1024);
    let objects = SimObjectStore::new(SimConfig::with_seed(3));
    let manager = StorageManager::new(kv, objects.clone()).with_config(config());
    let saved = records(300);

    let result = manager.save(&saved, &NoProgress).await;

    assert_eq!(result.storage_type, Some(BackendId::ObjectStore));
    assert!(manager.key_value().keys()?.is_empty());
    assert!(!objects.is_empty());
    assert_eq!(manager.load().await.unwrap().records, saved);
    Ok(())
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use forest_store::SqliteObjectStore;

    #[tokio::test]
    async fn test_sqlite_round_trip_survives_reopen() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let db_path = dir.path().join("forest.db");
        let kv_dir = dir.path().join("kv");
        let saved = records(1_234);
        let store_config = || config().with_threshold_bytes(1).with_object_batch_size(200);

        {
            let manager = StorageManager::new(
                FileKeyValueStore::open(&kv_dir)?,
                SqliteObjectStore::open_path(&db_path)?,
            )
            .with_config(store_config());
            let result = manager.save(&saved, &NoProgress).await;
            assert_eq!(result.storage_type, Some(BackendId::ObjectStore));
            assert_eq!(result.batch_count, 7);
        }

        let manager = StorageManager::new(
            FileKeyValueStore::open(&kv_dir)?,
            SqliteObjectStore::open_path(&db_path)?,
        )
        .with_config(store_config());

        let loaded = manager.load().await.expect("generation in sqlite");
        assert_eq!(loaded.storage_type, BackendId::ObjectStore);
        assert_eq!(loaded.records, saved);

        let info = manager.storage_info().await;
        assert_eq!(info.current, Some(BackendId::ObjectStore));

        manager.clear_all().await;
        assert!(manager.load().await.is_none());
        Ok(())
    }
}

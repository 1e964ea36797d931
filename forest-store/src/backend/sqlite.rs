//! SQLite Backend - Persistent Object Store
//!
//! `TigerStyle`: Blocking `rusqlite` calls run on the blocking pool, never on
//! the async executor.
//!
//! Entries live in one table keyed by their in-line `id`. Every statement
//! runs in its own implicit transaction, matching the one-transaction-per-put
//! contract of [`ObjectStoreConnection`].

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::constants::OBJECT_STORE_NAME_DEFAULT;

use super::error::{BackendError, BackendResult};
use super::{entry_id, BackendId, ObjectStore, ObjectStoreConnection};

impl From<rusqlite::Error> for BackendError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Io(format!("sqlite: {err}"))
    }
}

/// SQLite-backed object store (Backend B).
#[derive(Debug, Clone)]
pub struct SqliteObjectStore {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteObjectStore {
    /// Open or create a database file.
    ///
    /// # Errors
    /// Returns [`BackendError::Unavailable`] if the file cannot be opened.
    pub fn open_path(path: impl AsRef<Path>) -> BackendResult<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| {
            BackendError::unavailable(BackendId::ObjectStore, format!("sqlite open: {e}"))
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Ok(Self::from_connection(conn))
    }

    /// Create an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns [`BackendError::Unavailable`] if `SQLite` cannot allocate one.
    pub fn in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            BackendError::unavailable(BackendId::ObjectStore, format!("sqlite open: {e}"))
        })?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
            table: OBJECT_STORE_NAME_DEFAULT.to_string(),
        }
    }
}

/// Run `f` against the shared connection on the blocking pool.
async fn blocking<T, F>(conn: &Arc<Mutex<Connection>>, f: F) -> BackendResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> BackendResult<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    })
    .await
    .map_err(|e| BackendError::unavailable(BackendId::ObjectStore, format!("blocking task: {e}")))?
}

#[async_trait]
impl ObjectStore for SqliteObjectStore {
    type Connection = SqliteObjectConnection;

    #[tracing::instrument(level = "debug", skip(self), fields(table = %self.table))]
    async fn open(&self) -> BackendResult<SqliteObjectConnection> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (id TEXT PRIMARY KEY, value TEXT NOT NULL);",
            self.table
        );
        blocking(&self.conn, move |conn| {
            conn.execute_batch(&sql).map_err(|e| {
                BackendError::unavailable(BackendId::ObjectStore, format!("create table: {e}"))
            })
        })
        .await?;

        Ok(SqliteObjectConnection {
            conn: Arc::clone(&self.conn),
            table: self.table.clone(),
        })
    }
}

/// Open connection to a [`SqliteObjectStore`].
#[derive(Debug)]
pub struct SqliteObjectConnection {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

#[async_trait]
impl ObjectStoreConnection for SqliteObjectConnection {
    async fn put(&self, entry: &Value) -> BackendResult<()> {
        let id = entry_id(entry)?.to_string();
        let text = serde_json::to_string(entry)?;
        let sql = format!("INSERT OR REPLACE INTO \"{}\" (id, value) VALUES (?1, ?2)", self.table);

        blocking(&self.conn, move |conn| {
            conn.execute(&sql, params![id, text])
                .map(|_| ())
                .map_err(|e| BackendError::transaction_aborted(id, e.to_string()))
        })
        .await
    }

    async fn get(&self, id: &str) -> BackendResult<Option<Value>> {
        let id = id.to_string();
        let sql = format!("SELECT value FROM \"{}\" WHERE id = ?1", self.table);

        blocking(&self.conn, move |conn| {
            let text: Option<String> = conn
                .query_row(&sql, params![id], |row| row.get(0))
                .optional()?;
            text.map(|t| {
                serde_json::from_str(&t).map_err(|e| BackendError::malformed(id, e.to_string()))
            })
            .transpose()
        })
        .await
    }

    async fn clear(&self) -> BackendResult<()> {
        let sql = format!("DELETE FROM \"{}\"", self.table);
        blocking(&self.conn, move |conn| {
            conn.execute(&sql, []).map(|_| ()).map_err(BackendError::from)
        })
        .await
    }

    async fn count(&self) -> BackendResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        blocking(&self.conn, move |conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_count_clear() {
        let store = SqliteObjectStore::in_memory().unwrap();
        let conn = store.open().await.unwrap();

        conn.put(&json!({"id": "batch_0", "data": [{"_id": "a"}], "batchIndex": 0}))
            .await
            .unwrap();
        conn.put(&json!({"id": "batch_info", "totalBatches": 1}))
            .await
            .unwrap();
        assert_eq!(conn.count().await.unwrap(), 2);

        let entry = conn.get("batch_0").await.unwrap().unwrap();
        assert_eq!(entry["data"][0]["_id"], "a");
        assert_eq!(conn.get("batch_9").await.unwrap(), None);

        conn.clear().await.unwrap();
        assert_eq!(conn.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = SqliteObjectStore::in_memory().unwrap();
        let conn = store.open().await.unwrap();

        conn.put(&json!({"id": "x", "v": 1})).await.unwrap();
        conn.put(&json!({"id": "x", "v": 2})).await.unwrap();

        assert_eq!(conn.count().await.unwrap(), 1);
        assert_eq!(conn.get("x").await.unwrap().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn test_reopen_is_idempotent() {
        let store = SqliteObjectStore::in_memory().unwrap();
        store
            .open()
            .await
            .unwrap()
            .put(&json!({"id": "x"}))
            .await
            .unwrap();

        let again = store.open().await.unwrap();
        assert_eq!(again.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_skips_unparseable_row() {
        use crate::backend::SimKeyValueStore;
        use crate::dst::SimConfig;
        use crate::progress::NoProgress;
        use crate::record::{Record, RecordMeta};
        use crate::{StorageManager, StoreConfig};

        let store = SqliteObjectStore::in_memory().unwrap();
        let kv = SimKeyValueStore::new(SimConfig::with_seed(9));
        let manager = StorageManager::new(kv, store.clone()).with_config(
            StoreConfig::default()
                .with_threshold_bytes(1)
                .with_object_batch_size(10)
                .with_yield_duration_ms(0),
        );
        let records: Vec<Record> = (0..30)
            .map(|i| Record::new(RecordMeta::for_sheet_row(0, "造林", i)).with_field("面积", i))
            .collect();
        let result = manager.save(&records, &NoProgress).await;
        assert_eq!(result.batch_count, 3);

        store
            .conn
            .lock()
            .unwrap()
            .execute(
                "UPDATE \"forestData\" SET value = '{not json' WHERE id = 'batch_1'",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.open().await.unwrap().get("batch_1").await,
            Err(BackendError::MalformedStoredData { .. })
        ));

        let loaded = manager.load().await.unwrap();
        let expected: Vec<Record> = records[..10].iter().chain(&records[20..]).cloned().collect();
        assert_eq!(loaded.records, expected);
    }
}

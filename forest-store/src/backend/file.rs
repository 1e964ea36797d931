//! File Backend - Directory-Backed Key-Value Store
//!
//! `TigerStyle`: One file per key, quota checked before every write.
//!
//! Values are written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written value.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::constants::KEY_VALUE_QUOTA_BYTES_DEFAULT;

use super::error::{BackendError, BackendResult};
use super::KeyValueStore;

const VALUE_FILE_EXTENSION: &str = "kv";
const TEMP_FILE_EXTENSION: &str = "tmp";

/// Persistent key-value store keeping each key in its own file.
///
/// Keys are restricted to ASCII letters, digits, `_` and `-` so they map
/// one-to-one onto file names.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
    quota_bytes: usize,
}

impl FileKeyValueStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl AsRef<Path>) -> BackendResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "opened file key-value store");

        Ok(Self {
            dir,
            quota_bytes: KEY_VALUE_QUOTA_BYTES_DEFAULT,
        })
    }

    /// Set the quota in bytes.
    #[must_use]
    pub fn with_quota(mut self, quota_bytes: usize) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Root directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Bytes charged against the quota: key length plus value length.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be listed.
    pub fn usage_bytes(&self) -> BackendResult<usize> {
        let mut total = 0usize;
        for (key, path) in self.entries()? {
            let len = usize::try_from(fs::metadata(&path)?.len()).unwrap_or(usize::MAX);
            total = total.saturating_add(key.len()).saturating_add(len);
        }
        Ok(total)
    }

    fn path_for(&self, key: &str) -> BackendResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.{VALUE_FILE_EXTENSION}")))
    }

    fn entries(&self) -> BackendResult<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(VALUE_FILE_EXTENSION) {
                continue;
            }
            if let Some(key) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push((key.to_string(), path.clone()));
            }
        }
        Ok(entries)
    }
}

fn validate_key(key: &str) -> BackendResult<()> {
    if key.is_empty() {
        return Err(BackendError::invalid_key("key must not be empty"));
    }
    if !key
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(BackendError::invalid_key(format!(
            "key {key:?} contains characters outside [A-Za-z0-9_-]"
        )));
    }
    Ok(())
}

fn write_atomically(temp: &Path, path: &Path, value: &str) -> io::Result<()> {
    let mut file = fs::File::create(temp)?;
    file.write_all(value.as_bytes())?;
    file.sync_all()?;
    fs::rename(temp, path)
}

impl KeyValueStore for FileKeyValueStore {
    fn get_item(&self, key: &str) -> BackendResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[tracing::instrument(level = "trace", skip(self, value), fields(value_len = value.len()))]
    fn set_item(&self, key: &str, value: &str) -> BackendResult<()> {
        let path = self.path_for(key)?;

        let replaced = match fs::metadata(&path) {
            Ok(meta) => key.len() + usize::try_from(meta.len()).unwrap_or(usize::MAX),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        let needed = self
            .usage_bytes()?
            .saturating_sub(replaced)
            .saturating_add(key.len() + value.len());
        if needed > self.quota_bytes {
            return Err(BackendError::quota_exceeded(key, needed, self.quota_bytes));
        }

        let temp = path.with_extension(TEMP_FILE_EXTENSION);
        if let Err(e) = write_atomically(&temp, &path, value) {
            if let Err(cleanup) = fs::remove_file(&temp) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %temp.display(),
                        error = %cleanup,
                        "cannot remove temporary value file"
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> BackendResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> BackendResult<Vec<String>> {
        Ok(self.entries()?.into_iter().map(|(key, _)| key).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileKeyValueStore) {
        let dir = TempDir::new().unwrap();
        let store = FileKeyValueStore::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_set_get_remove() {
        let (_dir, store) = store();

        store.set_item("forest_data_batch_0", "[]").unwrap();
        assert_eq!(
            store.get_item("forest_data_batch_0").unwrap(),
            Some("[]".to_string())
        );

        store.remove_item("forest_data_batch_0").unwrap();
        assert_eq!(store.get_item("forest_data_batch_0").unwrap(), None);
        store.remove_item("forest_data_batch_0").unwrap();
    }

    #[test]
    fn test_values_survive_reopen() {
        let (dir, store) = store();
        store.set_item("k", "persisted").unwrap();
        drop(store);

        let reopened = FileKeyValueStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get_item("k").unwrap(), Some("persisted".to_string()));
        assert_eq!(reopened.keys().unwrap(), vec!["k".to_string()]);
    }

    #[test]
    fn test_quota() {
        let (_dir, store) = store();
        let store = store.with_quota(10);

        store.set_item("k", "123456789").unwrap();
        assert!(store.set_item("j", "x").unwrap_err().is_quota_exceeded());
        // Replacing in place fits
        store.set_item("k", "abcdefghi").unwrap();
        assert_eq!(store.usage_bytes().unwrap(), 10);
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let (_dir, store) = store();

        for key in ["", "../escape", "a/b", "dot.key"] {
            assert!(
                matches!(store.set_item(key, "v"), Err(BackendError::InvalidKey { .. })),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_failed_write_leaves_no_temp_file() {
        let (dir, store) = store();
        // A non-empty directory where the value file belongs blocks the rename
        let blocker = dir.path().join("k.kv");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("inner"), "x").unwrap();

        assert!(store.set_item("k", "value").is_err());
        assert!(!dir.path().join("k.tmp").exists());
    }
}

//! Secure key-value storage
//!
//! The gate persists everything through the [`SecureStorage`] trait. At-rest
//! encryption is the backend's concern; the gate only relies on typed
//! get/contains and an atomic batched write.
//!
//! Two backends ship with the crate:
//! - [`MemoryStorage`] keeps values in process memory
//! - [`FileStorage`] keeps a JSON document on disk, replaced atomically

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;

/// A single persisted value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    String(String),
    Bool(bool),
    StringSet(BTreeSet<String>),
}

impl StoredValue {
    fn kind(&self) -> &'static str {
        match self {
            StoredValue::String(_) => "string",
            StoredValue::Bool(_) => "bool",
            StoredValue::StringSet(_) => "string set",
        }
    }
}

/// A group of writes applied all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    entries: Vec<(String, StoredValue)>,
}

impl WriteBatch {
    /// Create an empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a string value
    pub fn put_string(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries
            .push((key.into(), StoredValue::String(value.into())));
        self
    }

    /// Set a boolean value
    pub fn put_bool(mut self, key: impl Into<String>, value: bool) -> Self {
        self.entries.push((key.into(), StoredValue::Bool(value)));
        self
    }

    /// Set a string set, replacing the previous set entirely
    pub fn put_string_set(mut self, key: impl Into<String>, value: BTreeSet<String>) -> Self {
        self.entries.push((key.into(), StoredValue::StringSet(value)));
        self
    }

    /// Number of writes in the batch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch contains no writes
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn apply_to(self, map: &mut BTreeMap<String, StoredValue>) {
        for (key, value) in self.entries {
            map.insert(key, value);
        }
    }
}

/// Durable key-value persistence consumed by the gate
///
/// Implementations must make [`write_batch`](SecureStorage::write_batch)
/// atomic: a reader observes either every entry of the batch or none.
pub trait SecureStorage: Send + Sync {
    /// Read the raw value stored under `key`
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError>;

    /// Apply every write in `batch` atomically
    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Read-modify-write of `key`
    ///
    /// `f` sees the current value and returns the batch to commit. No other
    /// write to this store lands between the read and the commit.
    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), StorageError>;

    /// Whether any value is stored under `key`
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key)?.is_some())
    }

    /// Read a string value
    fn get_string(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::String(s)) => Ok(Some(s)),
            Some(other) => Err(mismatch(key, "string", &other)),
        }
    }

    /// Read a boolean value, falling back to `default` when absent
    fn get_bool(&self, key: &str, default: bool) -> Result<bool, StorageError> {
        match self.get(key)? {
            None => Ok(default),
            Some(StoredValue::Bool(b)) => Ok(b),
            Some(other) => Err(mismatch(key, "bool", &other)),
        }
    }

    /// Read a string set, falling back to `default` when absent
    fn get_string_set(
        &self,
        key: &str,
        default: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, StorageError> {
        match self.get(key)? {
            None => Ok(default),
            Some(StoredValue::StringSet(set)) => Ok(set),
            Some(other) => Err(mismatch(key, "string set", &other)),
        }
    }
}

/// Computes a batch from the current value of a key
pub type UpdateFn<'a> = dyn FnMut(Option<StoredValue>) -> Result<WriteBatch, StorageError> + 'a;

fn mismatch(key: &str, expected: &'static str, found: &StoredValue) -> StorageError {
    debug!(key, found = found.kind(), expected, "stored value kind mismatch");
    StorageError::TypeMismatch {
        key: key.to_string(),
        expected,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StorageError> {
    mutex
        .lock()
        .map_err(|_| StorageError::Backend("storage lock poisoned".into()))
}

/// In-process storage, lost when the process exits
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, StoredValue>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecureStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        batch.apply_to(&mut *lock(&self.values)?);
        Ok(())
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), StorageError> {
        let mut values = lock(&self.values)?;
        let batch = f(values.get(key).cloned())?;
        batch.apply_to(&mut values);
        Ok(())
    }
}

/// Storage backed by a single JSON document
///
/// Every batch is applied to a copy of the current document, written to a
/// temporary file and renamed over the original. The in-memory view is only
/// replaced once the rename succeeds, so a failed write leaves both the file
/// and the cache untouched.
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, StoredValue>>,
}

impl FileStorage {
    /// Open the store at `path`, creating parent directories as needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let values = if path.exists() {
            let contents = fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), "opened file storage");
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn persist(&self, values: &BTreeMap<String, StoredValue>) -> Result<(), StorageError> {
        let contents = serde_json::to_string_pretty(values)?;

        // A leftover temp file would keep its old mode, so start from scratch
        let temp_path = self.path.with_extension("json.tmp");
        match fs::remove_file(&temp_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600); // Read/write for owner only
        }

        let mut file = options.open(&temp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }

    fn commit(
        &self,
        current: &mut BTreeMap<String, StoredValue>,
        batch: WriteBatch,
    ) -> Result<(), StorageError> {
        let mut next = current.clone();
        let count = batch.len();
        batch.apply_to(&mut next);

        self.persist(&next)?;
        *current = next;

        debug!(path = %self.path.display(), entries = count, "committed storage batch");
        Ok(())
    }
}

impl SecureStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<StoredValue>, StorageError> {
        Ok(lock(&self.values)?.get(key).cloned())
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut current = lock(&self.values)?;
        self.commit(&mut current, batch)
    }

    fn update(&self, key: &str, f: &mut UpdateFn<'_>) -> Result<(), StorageError> {
        let mut current = lock(&self.values)?;
        let batch = f(current.get(key).cloned())?;
        self.commit(&mut current, batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_typed_getters_and_defaults() {
        let storage = MemoryStorage::new();

        assert_eq!(storage.get_string("missing").unwrap(), None);
        assert!(storage.get_bool("missing", true).unwrap());
        assert!(storage
            .get_string_set("missing", BTreeSet::new())
            .unwrap()
            .is_empty());

        storage
            .write_batch(
                WriteBatch::new()
                    .put_string("name", "value")
                    .put_bool("flag", false),
            )
            .unwrap();

        assert_eq!(storage.get_string("name").unwrap().as_deref(), Some("value"));
        assert!(!storage.get_bool("flag", true).unwrap());
        assert!(storage.contains("name").unwrap());
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let storage = MemoryStorage::new();
        storage
            .write_batch(WriteBatch::new().put_bool("flag", true))
            .unwrap();

        let err = storage.get_string("flag").unwrap_err();
        assert!(matches!(err, StorageError::TypeMismatch { expected: "string", .. }));
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("vault.json");

        {
            let storage = FileStorage::open(&path).unwrap();
            let set: BTreeSet<String> = ["a".to_string(), "b".to_string()].into();
            storage
                .write_batch(
                    WriteBatch::new()
                        .put_string("salt", "s")
                        .put_string_set("set", set),
                )
                .unwrap();
        }

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get_string("salt").unwrap().as_deref(), Some("s"));
        assert_eq!(storage.get_string_set("set", BTreeSet::new()).unwrap().len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_state() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("vault.json");
        let storage = FileStorage::open(&path).unwrap();
        storage
            .write_batch(WriteBatch::new().put_string("salt", "old"))
            .unwrap();

        // A directory squatting on the temp path makes the write fail
        fs::create_dir(path.with_extension("json.tmp")).unwrap();
        let result = storage.write_batch(
            WriteBatch::new()
                .put_string("salt", "new")
                .put_string("hash", "new"),
        );

        assert!(result.is_err());
        assert_eq!(storage.get_string("salt").unwrap().as_deref(), Some("old"));
        assert!(!storage.contains("hash").unwrap());
    }

    #[test]
    fn test_update_sees_current_value() {
        let storage = MemoryStorage::new();
        storage
            .update("count", &mut |current| {
                assert_eq!(current, None);
                Ok(WriteBatch::new().put_string("count", "1"))
            })
            .unwrap();
        storage
            .update("count", &mut |current| {
                assert_eq!(current, Some(StoredValue::String("1".into())));
                Ok(WriteBatch::new().put_string("count", "2"))
            })
            .unwrap();

        assert_eq!(storage.get_string("count").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::open(temp_dir.path().join("vault.json")).unwrap();

        let result = storage.update("salt", &mut |_| Err(StorageError::Backend("refused".into())));

        assert!(result.is_err());
        assert!(!storage.contains("salt").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("vault.json");
        let temp_path = path.with_extension("json.tmp");

        // Stale world-readable temp file from an interrupted write
        fs::write(&temp_path, "{}").unwrap();
        fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o644)).unwrap();

        let storage = FileStorage::open(&path).unwrap();
        storage
            .write_batch(WriteBatch::new().put_string("salt", "s"))
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

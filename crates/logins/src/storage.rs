//! Key-value persistence for logins, options and active filters.
//!
//! Extension storage is asynchronous, so the trait is too. Everything
//! runs on one event loop, hence `?Send`.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::{LoginError, Result};

/// Per-item byte limit of the browser's sync storage area
pub const SYNC_QUOTA_BYTES_PER_ITEM: usize = 8192;

// ============================================================================
// Storage Area Trait
// ============================================================================

/// Trait for swappable storage backends
///
/// Implementations:
/// - InMemoryStorage: volatile, optionally quota-bounded (mirrors the sync area)
/// - FileStorage: one JSON file per key under a data directory
#[async_trait(?Send)]
pub trait StorageArea {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store or replace the value under `key`
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;
}

#[async_trait(?Send)]
impl<T: StorageArea + ?Sized> StorageArea for Rc<T> {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        (**self).remove(key).await
    }
}

/// Read and deserialize a typed value
pub async fn load<T: DeserializeOwned>(area: &dyn StorageArea, key: &str) -> Result<Option<T>> {
    match area.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| LoginError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

/// Serialize and store a typed value
pub async fn save<T: Serialize + ?Sized>(area: &dyn StorageArea, key: &str, value: &T) -> Result<()> {
    let value = serde_json::to_value(value).map_err(|e| LoginError::Serialization(e.to_string()))?;
    area.set(key, value).await
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(LoginError::InvalidKey("Key cannot be empty".to_string()));
    }
    if key.contains(|c: char| c == '/' || c == '\\') || key.starts_with('.') {
        return Err(LoginError::InvalidKey(key.to_string()));
    }
    Ok(())
}

// ============================================================================
// In-Memory Implementation
// ============================================================================

/// In-memory storage area
///
/// With a quota, `set` fails with `QuotaExceeded` when the key plus the
/// serialized value exceed the per-item limit, the way the browser's sync
/// area does.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    items: RefCell<HashMap<String, Value>>,
    quota_per_item: Option<usize>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_per_item: usize) -> Self {
        Self {
            items: RefCell::new(HashMap::new()),
            quota_per_item: Some(quota_per_item),
        }
    }

    /// Storage area limited like the browser sync area
    pub fn sync_area() -> Self {
        Self::with_quota(SYNC_QUOTA_BYTES_PER_ITEM)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }
}

#[async_trait(?Send)]
impl StorageArea for InMemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.borrow().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        validate_key(key)?;

        if let Some(quota) = self.quota_per_item {
            let bytes = key.len() + value.to_string().len();
            if bytes > quota {
                return Err(LoginError::QuotaExceeded {
                    key: key.to_string(),
                    bytes,
                    quota,
                });
            }
        }

        self.items.borrow_mut().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

// ============================================================================
// File Implementation
// ============================================================================

/// Local storage tier persisted as `<dir>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait(?Send)]
impl StorageArea for FileStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .map_err(|e| LoginError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| LoginError::Serialization(e.to_string()))
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).map_err(|e| LoginError::Storage(e.to_string()))?;

        let content = serde_json::to_string_pretty(&value)
            .map_err(|e| LoginError::Serialization(e.to_string()))?;
        fs::write(&path, content)
            .map_err(|e| LoginError::Storage(format!("Failed to write {}: {}", path.display(), e)))
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LoginError::Storage(e.to_string())),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Login, Options};

    #[tokio::test]
    async fn test_in_memory_set_get_remove() {
        let storage = InMemoryStorage::new();

        storage.set("pwmLoginOptions", serde_json::json!({"autoLogin": true})).await.unwrap();
        let options: Options = load(&storage, "pwmLoginOptions").await.unwrap().unwrap();
        assert!(options.auto_login);

        storage.remove("pwmLoginOptions").await.unwrap();
        assert!(storage.get("pwmLoginOptions").await.unwrap().is_none());

        // Removing twice is fine
        storage.remove("pwmLoginOptions").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let storage = InMemoryStorage::new();
        assert!(matches!(
            storage.set("", Value::Null).await,
            Err(LoginError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_quota_exceeded_keeps_previous_value() {
        let storage = InMemoryStorage::with_quota(128);
        save(&storage, "creds", &vec![Login::new("a", "b", "")]).await.unwrap();

        let many: Vec<Login> = (0..10)
            .map(|i| Login::new(format!("user{i}@example.com"), "pw", "long enough"))
            .collect();
        let err = save(&storage, "creds", &many).await.unwrap_err();
        assert!(matches!(err, LoginError::QuotaExceeded { quota: 128, .. }));

        let kept: Vec<Login> = load(&storage, "creds").await.unwrap().unwrap();
        assert_eq!(kept.len(), 1);
    }

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let logins = vec![Login::new("a@x.com", "pw", "foo").with_category("type", "single")];

        let storage = FileStorage::new(dir.path().join("store"));
        save(&storage, "pwmLoginCreds", &logins).await.unwrap();

        let reopened = FileStorage::new(dir.path().join("store"));
        let loaded: Vec<Login> = load(&reopened, "pwmLoginCreds").await.unwrap().unwrap();
        assert_eq!(loaded, logins);

        reopened.remove("pwmLoginCreds").await.unwrap();
        assert!(reopened.get("pwmLoginCreds").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.set("../escape", Value::Null).await,
            Err(LoginError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_file_storage_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.get("nothing").await.unwrap().is_none());
    }
}

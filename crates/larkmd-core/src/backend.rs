//! Storage backend abstraction.
//!
//! The host platform offers a partitioned key/value store with a change
//! stream. [`StorageBackend`] captures that contract; [`MemoryStorage`] is
//! the in-process implementation used for tests and single-context embedding.
//! The SQLite implementation lives in `larkmd-storage`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{BackendError, Result};

/// Capacity of change stream channels.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Storage partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageArea {
    /// Synchronized across the user's devices and every execution context.
    Sync,
    /// Local to this installation.
    Local,
}

impl StorageArea {
    /// Returns the area name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Sync => "sync",
            StorageArea::Local => "local",
        }
    }

    /// Parses an area from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sync" => Some(StorageArea::Sync),
            "local" => Some(StorageArea::Local),
            _ => None,
        }
    }
}

/// A single persisted change, as seen on the change stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub area: StorageArea,
    pub key: String,
    /// New value, or `None` when the key was removed.
    pub new_value: Option<Value>,
}

/// Partitioned key/value storage with change notifications.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads a key. Absent keys return `Ok(None)`.
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>>;

    /// Writes a key, replacing any previous value.
    async fn set(&self, area: StorageArea, key: &str, value: Value) -> Result<()>;

    /// Removes a key. Removing an absent key is not an error.
    async fn remove(&self, area: StorageArea, key: &str) -> Result<()>;

    /// Subscribes to the change stream.
    ///
    /// Changes made after this call returns are delivered to the receiver,
    /// including changes made by other execution contexts when the backend
    /// can observe them.
    fn changes(&self) -> broadcast::Receiver<StorageChange>;
}

/// In-memory storage backend.
pub struct MemoryStorage {
    items: RwLock<HashMap<(StorageArea, String), Value>>,
    changes_tx: broadcast::Sender<StorageChange>,
    readable: AtomicBool,
    writable: AtomicBool,
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("items", &self.items.read().len())
            .field("readable", &self.readable.load(Ordering::Relaxed))
            .field("writable", &self.writable.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (changes_tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            items: RwLock::new(HashMap::new()),
            changes_tx,
            readable: AtomicBool::new(true),
            writable: AtomicBool::new(true),
        }
    }

    /// Makes reads fail with [`BackendError::Unavailable`] while `false`.
    pub fn set_readable(&self, readable: bool) {
        self.readable.store(readable, Ordering::SeqCst);
    }

    /// Makes writes fail with [`BackendError::Rejected`] while `false`.
    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::SeqCst);
    }

    /// Writes a raw value without going through any typed layer.
    pub fn insert_raw(&self, area: StorageArea, key: &str, value: Value) {
        self.items.write().insert((area, key.to_string()), value.clone());
        self.notify(area, key, Some(value));
    }

    fn notify(&self, area: StorageArea, key: &str, new_value: Option<Value>) {
        // No receivers is fine
        let _ = self.changes_tx.send(StorageChange {
            area,
            key: key.to_string(),
            new_value,
        });
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Rejected("storage is read-only".into()))
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>> {
        if !self.readable.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("storage is not readable".into()));
        }
        Ok(self.items.read().get(&(area, key.to_string())).cloned())
    }

    async fn set(&self, area: StorageArea, key: &str, value: Value) -> Result<()> {
        self.check_writable()?;
        self.items.write().insert((area, key.to_string()), value.clone());
        self.notify(area, key, Some(value));
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<()> {
        self.check_writable()?;
        let removed = self.items.write().remove(&(area, key.to_string()));
        if removed.is_some() {
            self.notify(area, key, None);
        }
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageChange> {
        self.changes_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_set_remove() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get(StorageArea::Sync, "k").await.unwrap(), None);

        storage.set(StorageArea::Sync, "k", json!(1)).await.unwrap();
        assert_eq!(storage.get(StorageArea::Sync, "k").await.unwrap(), Some(json!(1)));
        // Areas are separate
        assert_eq!(storage.get(StorageArea::Local, "k").await.unwrap(), None);

        storage.remove(StorageArea::Sync, "k").await.unwrap();
        assert_eq!(storage.get(StorageArea::Sync, "k").await.unwrap(), None);
        storage.remove(StorageArea::Sync, "k").await.unwrap();
    }

    #[tokio::test]
    async fn changes_are_broadcast() {
        let storage = MemoryStorage::new();
        let mut rx = storage.changes();

        storage.set(StorageArea::Local, "a", json!("x")).await.unwrap();
        storage.remove(StorageArea::Local, "a").await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.area, StorageArea::Local);
        assert_eq!(first.key, "a");
        assert_eq!(first.new_value, Some(json!("x")));

        let second = rx.recv().await.unwrap();
        assert_eq!(second.new_value, None);
    }

    #[tokio::test]
    async fn failure_toggles() {
        let storage = MemoryStorage::new();

        storage.set_writable(false);
        assert!(matches!(
            storage.set(StorageArea::Sync, "k", json!(1)).await,
            Err(BackendError::Rejected(_))
        ));
        storage.set_writable(true);
        storage.set(StorageArea::Sync, "k", json!(1)).await.unwrap();

        storage.set_readable(false);
        assert!(matches!(
            storage.get(StorageArea::Sync, "k").await,
            Err(BackendError::Unavailable(_))
        ));
    }

    #[test]
    fn area_names() {
        assert_eq!(StorageArea::Sync.as_str(), "sync");
        assert_eq!(StorageArea::parse("LOCAL"), Some(StorageArea::Local));
        assert_eq!(StorageArea::parse("session"), None);
    }
}

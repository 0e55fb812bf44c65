//! Domain configuration persistence.
//!
//! The storage backend is the single source of truth. `load` always goes to
//! the backend; there is no local cache to go stale.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{StorageArea, StorageBackend};
use crate::config::{DomainConfig, DOMAIN_CONFIG_KEY};
use crate::error::StoreError;
use crate::notifier::{ChangeNotifier, Subscription};

/// Loads, saves and watches the [`DomainConfig`].
pub struct DomainConfigStore {
    backend: Arc<dyn StorageBackend>,
    notifier: ChangeNotifier,
    bridge: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for DomainConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DomainConfigStore")
            .field("notifier", &self.notifier)
            .field("attached", &self.bridge.lock().is_some())
            .finish()
    }
}

impl DomainConfigStore {
    /// Creates a store over `backend`.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            notifier: ChangeNotifier::new(),
            bridge: Mutex::new(None),
        }
    }

    /// Reads the current configuration.
    ///
    /// Never fails: absent or unreadable state yields the empty config, and
    /// invalid stored entries are left out of the returned view.
    pub async fn load(&self) -> DomainConfig {
        self.load_for_update().await.unwrap_or_else(|e| {
            warn!("Failed to read domain config, using default: {}", e);
            DomainConfig::default()
        })
    }

    /// Reads the current configuration as the base of a mutation.
    ///
    /// Unlike [`load`](Self::load), backend and deserialization failures are
    /// returned, so a failed read is never mistaken for an empty list.
    pub async fn load_for_update(&self) -> Result<DomainConfig, StoreError> {
        let value = self.backend.get(StorageArea::Sync, DOMAIN_CONFIG_KEY).await?;
        Ok(DomainConfig::from_stored(value.as_ref())?)
    }

    /// Persists `config`, replacing whatever was stored.
    pub async fn save(&self, config: &DomainConfig) -> Result<(), StoreError> {
        self.backend
            .set(StorageArea::Sync, DOMAIN_CONFIG_KEY, config.to_stored())
            .await?;
        debug!(domains = config.custom_domains.len(), "Saved domain config");
        Ok(())
    }

    /// Registers `callback` for every persisted change, from this or any
    /// other execution context.
    ///
    /// Delivery happens on a background task, so a caller's own `save` is
    /// not observed synchronously. The first subscription starts that task
    /// and therefore must happen within a Tokio runtime.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DomainConfig) + Send + Sync + 'static,
    {
        self.ensure_attached();
        self.notifier.subscribe(callback)
    }

    fn ensure_attached(&self) {
        let mut bridge = self.bridge.lock();
        if bridge.is_none() {
            *bridge = Some(self.notifier.attach(Arc::clone(&self.backend)));
        }
    }
}

impl Drop for DomainConfigStore {
    fn drop(&mut self) {
        if let Some(handle) = self.bridge.lock().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStorage;
    use crate::domain::Domain;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn domains(names: &[&str]) -> Vec<Domain> {
        names.iter().map(|d| Domain::parse(d).unwrap()).collect()
    }

    #[tokio::test]
    async fn load_absent_is_default() {
        let store = DomainConfigStore::new(Arc::new(MemoryStorage::new()));
        assert_eq!(store.load().await, DomainConfig::default());
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = DomainConfigStore::new(Arc::new(MemoryStorage::new()));
        let config = DomainConfig {
            custom_domains: domains(&["b.example.com", "a.example.com"]),
        };
        store.save(&config).await.unwrap();
        assert_eq!(store.load().await, config);
    }

    #[tokio::test]
    async fn load_filters_invalid_without_rewriting() {
        let storage = Arc::new(MemoryStorage::new());
        let raw = json!({"customDomains": ["ok.example.com", "://broken", "also ok.com"]});
        storage.insert_raw(StorageArea::Sync, DOMAIN_CONFIG_KEY, raw.clone());

        let store = DomainConfigStore::new(storage.clone());
        assert_eq!(store.load().await.custom_domains, domains(&["ok.example.com"]));

        // Stored value is untouched
        let stored = storage
            .get(StorageArea::Sync, DOMAIN_CONFIG_KEY)
            .await
            .unwrap();
        assert_eq!(stored, Some(raw));
    }

    #[tokio::test]
    async fn load_degrades_on_errors() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert_raw(StorageArea::Sync, DOMAIN_CONFIG_KEY, json!([1, 2, 3]));
        let store = DomainConfigStore::new(storage.clone());
        assert_eq!(store.load().await, DomainConfig::default());
        assert!(matches!(
            store.load_for_update().await,
            Err(StoreError::Serialization(_))
        ));

        storage.set_readable(false);
        assert_eq!(store.load().await, DomainConfig::default());
        assert!(matches!(
            store.load_for_update().await,
            Err(StoreError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn save_failure_is_reported() {
        let storage = Arc::new(MemoryStorage::new());
        let store = DomainConfigStore::new(storage.clone());
        storage.set_writable(false);

        let config = DomainConfig {
            custom_domains: domains(&["example.com"]),
        };
        assert!(store.save(&config).await.is_err());
        assert_eq!(store.load().await, DomainConfig::default());
    }

    #[tokio::test]
    async fn subscribe_sees_other_context_writes() {
        let storage: Arc<MemoryStorage> = Arc::new(MemoryStorage::new());
        let ours = DomainConfigStore::new(storage.clone());
        let theirs = DomainConfigStore::new(storage.clone());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = ours.subscribe(move |config| {
            let _ = tx.send(config.clone());
        });

        let config = DomainConfig {
            custom_domains: domains(&["wiki.example.com"]),
        };
        theirs.save(&config).await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen, config);

        sub.unsubscribe();
        theirs.save(&DomainConfig::default()).await.unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}

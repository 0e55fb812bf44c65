//! Observer registry for domain configuration changes.
//!
//! ## Architecture
//!
//! ```text
//! StorageBackend::changes() ──▶ bridge task ──▶ filter (sync area, customDomains key)
//!                                                    │
//!                                                    ▼
//!                                     ChangeNotifier::publish(config)
//!                                                    │
//!                                  ┌─────────────────┼─────────────────┐
//!                                  ▼                 ▼                 ▼
//!                             menu builder      injector          options UI
//! ```
//!
//! The registry itself knows nothing about storage: anything that produces
//! [`DomainConfig`] values can drive it through [`ChangeNotifier::publish`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::backend::{StorageArea, StorageBackend, StorageChange};
use crate::config::{DomainConfig, DOMAIN_CONFIG_KEY};

/// Callback invoked with each new configuration.
pub type ConfigCallback = Arc<dyn Fn(&DomainConfig) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    subscribers: Vec<(u64, ConfigCallback)>,
}

/// Fan-out of configuration changes to any number of subscribers.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl ChangeNotifier {
    /// Creates a notifier with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`. Subscribers are invoked in subscription order.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DomainConfig) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.push((id, Arc::new(callback)));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
            active: AtomicBool::new(true),
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Delivers `config` to every active subscriber.
    pub fn publish(&self, config: &DomainConfig) {
        // Snapshot so callbacks may subscribe or unsubscribe freely
        let callbacks: Vec<ConfigCallback> = self
            .registry
            .lock()
            .subscribers
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        debug!(
            subscribers = callbacks.len(),
            domains = config.custom_domains.len(),
            "Publishing domain config change"
        );
        for callback in callbacks {
            callback(config);
        }
    }

    /// Spawns a task forwarding domain config changes from `backend` to the
    /// subscribers. Only changes to the config key in the synchronized area
    /// are forwarded; a removed key is delivered as the empty config.
    ///
    /// Must be called within a Tokio runtime. Changes persisted after this
    /// returns are guaranteed to be observed.
    pub fn attach(&self, backend: Arc<dyn StorageBackend>) -> JoinHandle<()> {
        let mut rx = backend.changes();
        let notifier = self.clone();

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => {
                        if let Some(config) = config_from_change(&change) {
                            notifier.publish(&config);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Change stream lagged, reloading domain config");
                        let config = match backend.get(StorageArea::Sync, DOMAIN_CONFIG_KEY).await {
                            Ok(value) => config_or_default(value.as_ref()),
                            Err(e) => {
                                warn!("Failed to reload domain config: {}", e);
                                continue;
                            }
                        };
                        notifier.publish(&config);
                    }
                    Err(RecvError::Closed) => {
                        debug!("Change stream closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Maps a raw storage change to a config, if it concerns the domain config.
fn config_from_change(change: &StorageChange) -> Option<DomainConfig> {
    if change.area != StorageArea::Sync || change.key != DOMAIN_CONFIG_KEY {
        return None;
    }
    Some(config_or_default(change.new_value.as_ref()))
}

/// Malformed stored values are logged and treated as the empty config.
fn config_or_default(value: Option<&Value>) -> DomainConfig {
    DomainConfig::from_stored(value).unwrap_or_else(|e| {
        warn!("Malformed domain config in change stream: {}", e);
        DomainConfig::default()
    })
}

/// Handle returned by [`ChangeNotifier::subscribe`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to stop delivery.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
    active: AtomicBool,
}

impl Subscription {
    /// Stops further delivery. Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().subscribers.retain(|(id, _)| *id != self.id);
        }
    }

    /// Returns true until [`Subscription::unsubscribe`] is called.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

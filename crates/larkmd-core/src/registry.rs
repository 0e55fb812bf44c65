//! Collaborator-facing view of the domain subsystem.
//!
//! Menu builders, the content-script injector and the options UI only talk
//! to [`DomainRegistry`]. Each call re-reads persisted state; nothing here is
//! cached across calls.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::StorageBackend;
use crate::config::DomainConfig;
use crate::domain::Domain;
use crate::gate::{GateResult, PermissionGate};
use crate::notifier::Subscription;
use crate::patterns::all_patterns;
use crate::permissions::PermissionBackend;
use crate::store::DomainConfigStore;

/// Where a domain comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainSource {
    /// Shipped with the extension.
    Builtin,
    /// Added by the user.
    Custom,
}

/// A domain with its source, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntry {
    pub domain: Domain,
    pub source: DomainSource,
}

/// Entry point for everything that consumes or edits the domain lists.
#[derive(Debug)]
pub struct DomainRegistry {
    store: Arc<DomainConfigStore>,
    gate: PermissionGate,
}

impl DomainRegistry {
    /// Creates a registry over `storage`, requesting grants from
    /// `permissions`.
    pub fn new(storage: Arc<dyn StorageBackend>, permissions: Arc<dyn PermissionBackend>) -> Self {
        let store = Arc::new(DomainConfigStore::new(storage));
        let gate = PermissionGate::new(Arc::clone(&store), permissions);
        Self { store, gate }
    }

    /// Current persisted configuration.
    pub async fn config(&self) -> DomainConfig {
        self.store.load().await
    }

    /// Built-in patterns followed by custom patterns.
    pub async fn all_url_patterns(&self) -> Vec<String> {
        let config = self.store.load().await;
        all_patterns(&Domain::builtins(), &config.custom_domains)
    }

    /// Built-in domains followed by custom domains, tagged with their source.
    pub async fn entries(&self) -> Vec<DomainEntry> {
        let config = self.store.load().await;
        Domain::builtins()
            .into_iter()
            .map(|domain| DomainEntry {
                domain,
                source: DomainSource::Builtin,
            })
            .chain(config.custom_domains.into_iter().map(|domain| DomainEntry {
                domain,
                source: DomainSource::Custom,
            }))
            .collect()
    }

    /// Registers `callback` for configuration changes.
    pub fn on_domain_config_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&DomainConfig) + Send + Sync + 'static,
    {
        self.store.subscribe(callback)
    }

    /// See [`PermissionGate::add`].
    pub async fn add_custom_domain(&self, raw: &str) -> GateResult<Domain> {
        self.gate.add(raw).await
    }

    /// See [`PermissionGate::remove`].
    pub async fn remove_custom_domain(&self, raw: &str) -> GateResult<Domain> {
        self.gate.remove(raw).await
    }

    /// Returns true if `url`'s host is a custom domain or one of its
    /// subdomains. Unparseable and non-http(s) URLs never match.
    pub async fn is_custom_domain_url(&self, url: &str) -> bool {
        match web_host(url) {
            Some(host) => self.store.load().await.covers_host(&host),
            None => false,
        }
    }

    /// Returns true if the extension may act on `url`: its host falls under
    /// a built-in or a custom domain.
    pub async fn is_supported_url(&self, url: &str) -> bool {
        match web_host(url) {
            Some(host) => self.store.load().await.is_supported_host(&host),
            None => false,
        }
    }
}

fn web_host(url: &str) -> Option<String> {
    let url = Url::parse(url.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.host_str().map(str::to_string)
}

//! Runtime permission backends.
//!
//! A permission grant authorizes privileged scripts on every origin matching
//! a set of URL patterns. Requests may prompt the user and stay pending until
//! the host answers.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::backend::{StorageArea, StorageBackend};
use crate::error::{BackendError, Result};

/// Local storage key for the granted-origins ledger.
pub const GRANTED_ORIGINS_KEY: &str = "grantedOrigins";

/// Host environment permission API.
#[async_trait]
pub trait PermissionBackend: Send + Sync {
    /// Requests a grant covering exactly `origins`. Returns whether it was
    /// granted.
    async fn request(&self, origins: &[String]) -> Result<bool>;

    /// Returns true if every origin in `origins` is already granted.
    async fn contains(&self, origins: &[String]) -> Result<bool>;
}

/// Backend that always grants or always denies, remembering what it granted.
#[derive(Debug)]
pub struct FixedPermissions {
    grant: bool,
    granted: Mutex<Vec<String>>,
    requests: AtomicUsize,
}

impl FixedPermissions {
    /// Grants every request.
    pub fn granting() -> Self {
        Self::new(true)
    }

    /// Denies every request.
    pub fn denying() -> Self {
        Self::new(false)
    }

    fn new(grant: bool) -> Self {
        Self {
            grant,
            granted: Mutex::new(Vec::new()),
            requests: AtomicUsize::new(0),
        }
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Origins granted so far, in grant order.
    pub fn granted(&self) -> Vec<String> {
        self.granted.lock().clone()
    }
}

#[async_trait]
impl PermissionBackend for FixedPermissions {
    async fn request(&self, origins: &[String]) -> Result<bool> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.grant {
            let mut granted = self.granted.lock();
            for origin in origins {
                if !granted.contains(origin) {
                    granted.push(origin.clone());
                }
            }
        }
        Ok(self.grant)
    }

    async fn contains(&self, origins: &[String]) -> Result<bool> {
        let granted = self.granted.lock();
        Ok(origins.iter().all(|o| granted.contains(o)))
    }
}

/// How a [`LedgerPermissions`] backend answers new requests.
#[derive(Clone)]
pub enum GrantPolicy {
    /// Grant without asking.
    Allow,
    /// Deny without asking.
    Deny,
    /// Ask a blocking prompt (e.g. a terminal confirmation).
    Prompt(Arc<dyn Fn(&[String]) -> bool + Send + Sync>),
}

impl fmt::Debug for GrantPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrantPolicy::Allow => f.write_str("Allow"),
            GrantPolicy::Deny => f.write_str("Deny"),
            GrantPolicy::Prompt(_) => f.write_str("Prompt"),
        }
    }
}

/// Permission backend that records grants in the local storage partition.
///
/// Grants survive restarts and are never revoked by this crate.
pub struct LedgerPermissions {
    storage: Arc<dyn StorageBackend>,
    policy: GrantPolicy,
}

impl fmt::Debug for LedgerPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerPermissions")
            .field("policy", &self.policy)
            .finish()
    }
}

impl LedgerPermissions {
    /// Creates a ledger over `storage` using `policy` for new requests.
    pub fn new(storage: Arc<dyn StorageBackend>, policy: GrantPolicy) -> Self {
        Self { storage, policy }
    }

    /// All origins granted so far.
    pub async fn granted(&self) -> Result<Vec<String>> {
        let value = self
            .storage
            .get(StorageArea::Local, GRANTED_ORIGINS_KEY)
            .await?;
        match value {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    async fn decide(&self, origins: &[String]) -> Result<bool> {
        match &self.policy {
            GrantPolicy::Allow => Ok(true),
            GrantPolicy::Deny => Ok(false),
            GrantPolicy::Prompt(prompt) => {
                let prompt = Arc::clone(prompt);
                let origins = origins.to_vec();
                tokio::task::spawn_blocking(move || prompt(&origins))
                    .await
                    .map_err(|e| BackendError::Permission(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl PermissionBackend for LedgerPermissions {
    async fn request(&self, origins: &[String]) -> Result<bool> {
        if self.contains(origins).await? {
            debug!(?origins, "Origins already granted");
            return Ok(true);
        }

        if !self.decide(origins).await? {
            info!(?origins, "Permission request denied");
            return Ok(false);
        }

        // Re-read so concurrent grants are kept
        let mut granted = self.granted().await?;
        for origin in origins {
            if !granted.contains(origin) {
                granted.push(origin.clone());
            }
        }
        self.storage
            .set(
                StorageArea::Local,
                GRANTED_ORIGINS_KEY,
                serde_json::to_value(&granted)?,
            )
            .await?;

        info!(?origins, "Permission granted");
        Ok(true)
    }

    async fn contains(&self, origins: &[String]) -> Result<bool> {
        let granted = self.granted().await?;
        Ok(origins.iter().all(|o| granted.contains(o)))
    }
}

//! Permission-gated mutation of the custom domain list.
//!
//! Adding a domain requests a runtime grant for its URL patterns first and
//! only persists the domain once the grant succeeds, so a stored domain
//! always has a matching grant. Removing a domain does not revoke the grant:
//! other contexts may rely on the same origin permission.
//!
//! ```text
//! add:    validating → checking-conflicts → requesting-permission → persisting → done
//! remove: validating → checking-conflicts → persisting → done
//!                  (any stage may end in rejected)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{normalize, Domain};
use crate::patterns::patterns_for;
use crate::permissions::PermissionBackend;
use crate::store::DomainConfigStore;

/// Why an add/remove was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("not a valid domain")]
    InvalidFormat,

    #[error("domain is built in")]
    AlreadyBuiltin,

    #[error("domain already added")]
    AlreadyExists,

    #[error("permission denied")]
    PermissionDenied,

    #[error("domain not found")]
    NotFound,

    /// Unexpected storage or host failure. Safe to retry.
    #[error("unexpected failure")]
    Unknown,
}

impl Rejection {
    /// Returns the reason code as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidFormat => "invalid_format",
            Rejection::AlreadyBuiltin => "already_builtin",
            Rejection::AlreadyExists => "already_exists",
            Rejection::PermissionDenied => "permission_denied",
            Rejection::NotFound => "not_found",
            Rejection::Unknown => "unknown",
        }
    }
}

/// Result of a gate operation. Never carries a lower-layer error.
pub type GateResult<T> = std::result::Result<T, Rejection>;

/// `{ success, reason }` view of a [`GateResult`] for UI surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl<T> From<GateResult<T>> for OpOutcome {
    fn from(result: GateResult<T>) -> Self {
        match result {
            Ok(_) => Self {
                success: true,
                reason: None,
            },
            Err(reason) => Self {
                success: false,
                reason: Some(reason),
            },
        }
    }
}

/// Stage of a gate operation, reported in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStage {
    Validating,
    CheckingConflicts,
    RequestingPermission,
    Persisting,
    Done,
    Rejected,
}

/// Validates, permission-checks and persists custom domain changes.
pub struct PermissionGate {
    store: Arc<DomainConfigStore>,
    permissions: Arc<dyn PermissionBackend>,
}

impl std::fmt::Debug for PermissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionGate")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

impl PermissionGate {
    /// Creates a gate writing to `store` and requesting grants from
    /// `permissions`.
    pub fn new(store: Arc<DomainConfigStore>, permissions: Arc<dyn PermissionBackend>) -> Self {
        Self { store, permissions }
    }

    /// Adds `raw` to the custom list once its patterns are granted.
    ///
    /// A grant obtained before a failed persist is left in place.
    pub async fn add(&self, raw: &str) -> GateResult<Domain> {
        trace_stage("add", raw, GateStage::Validating);
        let Some(domain) = Domain::parse(raw) else {
            return reject("add", raw, Rejection::InvalidFormat);
        };

        trace_stage("add", raw, GateStage::CheckingConflicts);
        if domain.is_builtin() {
            return reject("add", raw, Rejection::AlreadyBuiltin);
        }
        match self.store.load_for_update().await {
            Ok(config) if config.contains(&domain) => {
                return reject("add", raw, Rejection::AlreadyExists);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(domain = %domain, "Failed to read domain config: {}", e);
                return reject("add", raw, Rejection::Unknown);
            }
        }

        trace_stage("add", raw, GateStage::RequestingPermission);
        let origins = patterns_for(&domain).to_vec();
        match self.permissions.request(&origins).await {
            Ok(true) => {}
            Ok(false) => return reject("add", raw, Rejection::PermissionDenied),
            Err(e) => {
                warn!(domain = %domain, "Permission request failed: {}", e);
                return reject("add", raw, Rejection::Unknown);
            }
        }

        trace_stage("add", raw, GateStage::Persisting);
        // The prompt may have been pending for a while; mutate the latest state
        let mut config = match self.store.load_for_update().await {
            Ok(config) => config,
            Err(e) => {
                warn!(domain = %domain, "Failed to re-read domain config after grant: {}", e);
                return reject("add", raw, Rejection::Unknown);
            }
        };
        if config.contains(&domain) {
            return reject("add", raw, Rejection::AlreadyExists);
        }
        config.custom_domains.push(domain.clone());
        if let Err(e) = self.store.save(&config).await {
            warn!(domain = %domain, "Failed to persist domain after grant: {}", e);
            return reject("add", raw, Rejection::Unknown);
        }

        trace_stage("add", raw, GateStage::Done);
        info!(domain = %domain, "Custom domain added");
        Ok(domain)
    }

    /// Removes `raw` from the custom list. Does not revoke its grant.
    pub async fn remove(&self, raw: &str) -> GateResult<Domain> {
        trace_stage("remove", raw, GateStage::Validating);
        let normalized = normalize(raw);

        trace_stage("remove", raw, GateStage::CheckingConflicts);
        let mut config = match self.store.load_for_update().await {
            Ok(config) => config,
            Err(e) => {
                warn!(input = raw, "Failed to read domain config: {}", e);
                return reject("remove", raw, Rejection::Unknown);
            }
        };
        let Some(index) = config
            .custom_domains
            .iter()
            .position(|d| d.as_str() == normalized)
        else {
            return reject("remove", raw, Rejection::NotFound);
        };

        trace_stage("remove", raw, GateStage::Persisting);
        let domain = config.custom_domains.remove(index);
        if let Err(e) = self.store.save(&config).await {
            warn!(domain = %domain, "Failed to persist domain removal: {}", e);
            return reject("remove", raw, Rejection::Unknown);
        }

        trace_stage("remove", raw, GateStage::Done);
        info!(domain = %domain, "Custom domain removed");
        Ok(domain)
    }
}

fn trace_stage(op: &str, raw: &str, stage: GateStage) {
    debug!(op, input = raw, ?stage, "Domain gate stage");
}

fn reject<T>(op: &str, raw: &str, reason: Rejection) -> GateResult<T> {
    trace_stage(op, raw, GateStage::Rejected);
    debug!(op, input = raw, reason = reason.as_str(), "Domain operation rejected");
    Err(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryStorage, StorageArea, StorageBackend};
    use crate::config::{DomainConfig, DOMAIN_CONFIG_KEY};
    use crate::domain::BUILTIN_DOMAINS;
    use crate::error::{BackendError, Result};
    use crate::permissions::FixedPermissions;
    use async_trait::async_trait;
    use serde_json::json;

    struct Harness {
        storage: Arc<MemoryStorage>,
        store: Arc<DomainConfigStore>,
        permissions: Arc<FixedPermissions>,
        gate: PermissionGate,
    }

    fn harness(permissions: FixedPermissions) -> Harness {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(DomainConfigStore::new(storage.clone()));
        let permissions = Arc::new(permissions);
        let gate = PermissionGate::new(Arc::clone(&store), permissions.clone());
        Harness {
            storage,
            store,
            permissions,
            gate,
        }
    }

    fn names(config: &DomainConfig) -> Vec<&str> {
        config.custom_domains.iter().map(Domain::as_str).collect()
    }

    #[tokio::test]
    async fn add_normalizes_and_persists() {
        let h = harness(FixedPermissions::granting());

        let added = h.gate.add("  Docs.Example.COM ").await.unwrap();
        assert_eq!(added.as_str(), "docs.example.com");

        let config = h.store.load().await;
        assert_eq!(names(&config), vec!["docs.example.com"]);
        assert_eq!(
            h.permissions.granted(),
            vec!["https://docs.example.com/*", "https://*.docs.example.com/*"]
        );
    }

    #[tokio::test]
    async fn add_keeps_insertion_order() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("b.example.com").await.unwrap();
        h.gate.add("a.example.com").await.unwrap();
        h.gate.add("c.example.com").await.unwrap();
        assert_eq!(
            names(&h.store.load().await),
            vec!["b.example.com", "a.example.com", "c.example.com"]
        );
    }

    #[tokio::test]
    async fn add_invalid_has_no_side_effects() {
        let h = harness(FixedPermissions::granting());
        let before = h.store.load().await;

        assert_eq!(h.gate.add("not a domain").await, Err(Rejection::InvalidFormat));
        assert_eq!(
            h.gate.add("https://example.com").await,
            Err(Rejection::InvalidFormat)
        );
        assert_eq!(h.gate.add("").await, Err(Rejection::InvalidFormat));

        assert_eq!(h.store.load().await, before);
        assert_eq!(h.permissions.request_count(), 0);
    }

    #[tokio::test]
    async fn add_builtin_always_rejected() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("example.com").await.unwrap();

        for builtin in BUILTIN_DOMAINS {
            assert_eq!(h.gate.add(builtin).await, Err(Rejection::AlreadyBuiltin));
            let shouted = builtin.to_uppercase();
            assert_eq!(h.gate.add(&shouted).await, Err(Rejection::AlreadyBuiltin));
        }
        assert_eq!(h.permissions.request_count(), 1);
    }

    #[tokio::test]
    async fn add_duplicate_rejected() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("example.com").await.unwrap();
        assert_eq!(
            h.gate.add("EXAMPLE.com").await,
            Err(Rejection::AlreadyExists)
        );
        assert_eq!(names(&h.store.load().await), vec!["example.com"]);
        assert_eq!(h.permissions.request_count(), 1);
    }

    #[tokio::test]
    async fn add_denied_is_not_persisted() {
        let h = harness(FixedPermissions::denying());
        assert_eq!(
            h.gate.add("example.com").await,
            Err(Rejection::PermissionDenied)
        );
        assert!(h.store.load().await.custom_domains.is_empty());
    }

    #[tokio::test]
    async fn add_persist_failure_keeps_grant() {
        let h = harness(FixedPermissions::granting());
        h.storage.set_writable(false);

        assert_eq!(h.gate.add("example.com").await, Err(Rejection::Unknown));
        assert!(h.store.load().await.custom_domains.is_empty());
        // Grant obtained before the failed write stays
        assert_eq!(h.permissions.granted().len(), 2);
    }

    #[tokio::test]
    async fn remove_after_add() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("example.com").await.unwrap();
        h.gate.add("other.org").await.unwrap();

        let removed = h.gate.remove(" Example.com").await.unwrap();
        assert_eq!(removed.as_str(), "example.com");
        assert_eq!(names(&h.store.load().await), vec!["other.org"]);

        // No revocation
        assert!(h
            .permissions
            .contains(&patterns_for(&removed).to_vec())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn remove_unknown_is_not_found() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("example.com").await.unwrap();
        let before = h.store.load().await;

        assert_eq!(h.gate.remove("never.example.org").await, Err(Rejection::NotFound));
        assert_eq!(h.gate.remove("not a domain").await, Err(Rejection::NotFound));
        assert_eq!(h.store.load().await, before);
    }

    #[tokio::test]
    async fn remove_persist_failure_is_unknown() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("example.com").await.unwrap();
        h.storage.set_writable(false);

        assert_eq!(h.gate.remove("example.com").await, Err(Rejection::Unknown));
        assert_eq!(names(&h.store.load().await), vec!["example.com"]);
    }

    #[tokio::test]
    async fn add_with_unreadable_storage_is_unknown() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("a.example.com").await.unwrap();
        h.gate.add("b.example.com").await.unwrap();
        h.storage.set_readable(false);

        assert_eq!(h.gate.add("c.example.com").await, Err(Rejection::Unknown));
        assert_eq!(h.permissions.request_count(), 2);

        h.storage.set_readable(true);
        assert_eq!(
            names(&h.store.load().await),
            vec!["a.example.com", "b.example.com"]
        );
    }

    #[tokio::test]
    async fn add_with_malformed_stored_config_is_unknown() {
        let h = harness(FixedPermissions::granting());
        let raw = json!({"customDomains": "not-a-list"});
        h.storage
            .insert_raw(StorageArea::Sync, DOMAIN_CONFIG_KEY, raw.clone());

        assert_eq!(h.gate.add("example.com").await, Err(Rejection::Unknown));
        assert_eq!(
            h.storage.get(StorageArea::Sync, DOMAIN_CONFIG_KEY).await.unwrap(),
            Some(raw)
        );
    }

    #[tokio::test]
    async fn remove_with_unreadable_storage_is_unknown() {
        let h = harness(FixedPermissions::granting());
        h.gate.add("a.example.com").await.unwrap();
        h.gate.add("b.example.com").await.unwrap();
        h.storage.set_readable(false);

        assert_eq!(h.gate.remove("a.example.com").await, Err(Rejection::Unknown));

        h.storage.set_readable(true);
        assert_eq!(
            names(&h.store.load().await),
            vec!["a.example.com", "b.example.com"]
        );
    }

    /// Grants after yielding, so concurrent adds interleave at the prompt.
    struct SlowPermissions;

    #[async_trait]
    impl PermissionBackend for SlowPermissions {
        async fn request(&self, _origins: &[String]) -> Result<bool> {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            Ok(true)
        }

        async fn contains(&self, _origins: &[String]) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn concurrent_adds_keep_both() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(DomainConfigStore::new(storage));
        let gate = PermissionGate::new(Arc::clone(&store), Arc::new(SlowPermissions));

        let (a, b) = tokio::join!(gate.add("a.example.com"), gate.add("b.example.com"));
        assert!(a.is_ok());
        assert!(b.is_ok());

        let config = store.load().await;
        assert_eq!(config.custom_domains.len(), 2);
        assert!(config.contains(&Domain::parse("a.example.com").unwrap()));
        assert!(config.contains(&Domain::parse("b.example.com").unwrap()));
    }

    struct FailingPermissions;

    #[async_trait]
    impl PermissionBackend for FailingPermissions {
        async fn request(&self, _origins: &[String]) -> Result<bool> {
            Err(BackendError::Permission("host went away".into()))
        }

        async fn contains(&self, _origins: &[String]) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn permission_error_is_unknown() {
        let storage = Arc::new(MemoryStorage::new());
        let store = Arc::new(DomainConfigStore::new(storage.clone()));
        let gate = PermissionGate::new(Arc::clone(&store), Arc::new(FailingPermissions));

        assert_eq!(gate.add("example.com").await, Err(Rejection::Unknown));
        assert_eq!(
            storage.get(StorageArea::Sync, DOMAIN_CONFIG_KEY).await.unwrap(),
            None
        );
    }

    #[test]
    fn outcome_shape() {
        let ok: OpOutcome = GateResult::Ok(()).into();
        assert_eq!(
            serde_json::to_value(ok).unwrap(),
            serde_json::json!({"success": true})
        );

        let denied: OpOutcome = GateResult::<()>::Err(Rejection::PermissionDenied).into();
        assert_eq!(
            serde_json::to_value(denied).unwrap(),
            serde_json::json!({"success": false, "reason": "permission_denied"})
        );
    }

    #[test]
    fn reason_codes_match_serde() {
        for reason in [
            Rejection::InvalidFormat,
            Rejection::AlreadyBuiltin,
            Rejection::AlreadyExists,
            Rejection::PermissionDenied,
            Rejection::NotFound,
            Rejection::Unknown,
        ] {
            assert_eq!(
                serde_json::to_value(reason).unwrap(),
                serde_json::json!(reason.as_str())
            );
        }
    }
}

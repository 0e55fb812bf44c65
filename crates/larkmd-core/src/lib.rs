//! larkmd core - domain allow-list and permission gating.
//!
//! This crate decides which sites the Lark/Feishu Markdown exporter may act
//! on. It covers:
//!
//! - Domain validation and normalization ([`domain`])
//! - URL pattern derivation ([`patterns`])
//! - The persisted custom domain list ([`config`], [`store`])
//! - Permission-gated add/remove ([`gate`])
//! - Change fan-out to independent surfaces ([`notifier`])
//!
//! Host platform APIs are abstracted behind [`StorageBackend`] and
//! [`PermissionBackend`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use larkmd_core::{DomainRegistry, FixedPermissions, MemoryStorage};
//!
//! # async fn run() {
//! let registry = DomainRegistry::new(
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(FixedPermissions::granting()),
//! );
//!
//! registry.add_custom_domain("docs.example.com").await.unwrap();
//! assert!(registry.is_custom_domain_url("https://docs.example.com/docx/1").await);
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod domain;
pub mod error;
pub mod gate;
pub mod notifier;
pub mod patterns;
pub mod permissions;
pub mod registry;
pub mod store;

pub use backend::{MemoryStorage, StorageArea, StorageBackend, StorageChange};
pub use config::{DomainConfig, DOMAIN_CONFIG_KEY};
pub use domain::{normalize, validate, Domain, BUILTIN_DOMAINS};
pub use error::{BackendError, Result, StoreError};
pub use gate::{GateResult, OpOutcome, PermissionGate, Rejection};
pub use notifier::{ChangeNotifier, Subscription};
pub use patterns::{all_patterns, patterns_for, UrlPattern};
pub use permissions::{FixedPermissions, GrantPolicy, LedgerPermissions, PermissionBackend};
pub use registry::{DomainEntry, DomainRegistry, DomainSource};
pub use store::DomainConfigStore;

//! larkmd Storage - SQLite persistence layer.
//!
//! This crate provides a [`StorageBackend`](larkmd_core::StorageBackend) that
//! several processes can share through one database file. It handles:
//!
//! - Key/value items per storage area (`sync` and `local`)
//! - An append-only change log written in the same transaction as each item
//! - Polling the change log so every process sees every write
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use larkmd_core::{DomainRegistry, FixedPermissions};
//! use larkmd_storage::{Database, SqliteStorage};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Arc::new(Database::new()?);
//! let registry = DomainRegistry::new(
//!     Arc::new(SqliteStorage::new(db, "cli")),
//!     Arc::new(FixedPermissions::granting()),
//! );
//! registry.add_custom_domain("wiki.example.com").await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use backend::{SqliteStorage, DEFAULT_POLL_INTERVAL};
pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{ChangeRecord, StoredItem};
pub use pool::ConnectionPool;

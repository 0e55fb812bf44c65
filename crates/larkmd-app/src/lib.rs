//! larkmd - command-line front end for the custom domain allow-list.
//!
//! This crate provides the pieces behind the `larkmd` binary:
//!
//! - Subcommand implementations over a [`DomainRegistry`](larkmd_core::DomainRegistry) ([`commands`])
//! - Terminal confirmation for permission requests ([`prompt`])
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use larkmd_core::{DomainRegistry, LedgerPermissions, StorageBackend};
//! use larkmd_storage::{Database, SqliteStorage};
//! use larkmd_app::prompt::GrantMode;
//!
//! let storage: Arc<dyn StorageBackend> =
//!     Arc::new(SqliteStorage::new(Arc::new(Database::new()?), "cli"));
//! let permissions = Arc::new(LedgerPermissions::new(storage.clone(), GrantMode::Prompt.policy()));
//! let registry = DomainRegistry::new(storage, permissions);
//!
//! larkmd_app::commands::add_domain(&registry, "wiki.example.com", &mut std::io::stdout()).await?;
//! ```

pub mod commands;
pub mod prompt;

pub use commands::CliError;
pub use prompt::GrantMode;

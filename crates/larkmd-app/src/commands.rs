//! Subcommand implementations.
//!
//! Each command writes human-readable output to the given writer and returns
//! whether the requested operation succeeded.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use larkmd_core::{
    BackendError, DomainConfig, DomainRegistry, DomainSource, LedgerPermissions, Rejection,
    UrlPattern,
};
use larkmd_storage::{Database, StorageError};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

/// CLI command errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("output error: {0}")]
    Io(#[from] io::Error),

    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for CLI commands.
pub type Result<T> = std::result::Result<T, CliError>;

/// `domains list`: built-in then custom domains with their source.
pub async fn list_domains<W: Write>(registry: &DomainRegistry, out: &mut W) -> Result<()> {
    for entry in registry.entries().await {
        let source = match entry.source {
            DomainSource::Builtin => "builtin",
            DomainSource::Custom => "custom",
        };
        writeln!(out, "{:<32} {}", entry.domain.as_str(), source)?;
    }
    Ok(())
}

/// `domains add <domain>`.
pub async fn add_domain<W: Write>(registry: &DomainRegistry, raw: &str, out: &mut W) -> Result<bool> {
    match registry.add_custom_domain(raw).await {
        Ok(domain) => {
            writeln!(out, "Added {}", domain)?;
            Ok(true)
        }
        Err(reason) => {
            report_rejection(out, raw, reason)?;
            Ok(false)
        }
    }
}

/// `domains remove <domain>`.
pub async fn remove_domain<W: Write>(
    registry: &DomainRegistry,
    raw: &str,
    out: &mut W,
) -> Result<bool> {
    match registry.remove_custom_domain(raw).await {
        Ok(domain) => {
            writeln!(out, "Removed {}", domain)?;
            Ok(true)
        }
        Err(reason) => {
            report_rejection(out, raw, reason)?;
            Ok(false)
        }
    }
}

fn report_rejection<W: Write>(out: &mut W, raw: &str, reason: Rejection) -> io::Result<()> {
    writeln!(out, "Rejected {:?}: {} ({})", raw.trim(), reason, reason.as_str())
}

/// `patterns`: every match pattern, one per line.
pub async fn list_patterns<W: Write>(registry: &DomainRegistry, out: &mut W) -> Result<()> {
    for pattern in registry.all_url_patterns().await {
        writeln!(out, "{}", pattern)?;
    }
    Ok(())
}

/// `check <url>`: whether the exporter acts on `url`, and which patterns
/// scope the page menu to it.
pub async fn check_url<W: Write>(registry: &DomainRegistry, raw: &str, out: &mut W) -> Result<bool> {
    let Ok(url) = Url::parse(raw.trim()) else {
        writeln!(out, "Not a valid URL: {}", raw.trim())?;
        return Ok(false);
    };

    let supported = registry.is_supported_url(url.as_str()).await;
    let custom = registry.is_custom_domain_url(url.as_str()).await;
    writeln!(out, "url:       {}", url)?;
    writeln!(out, "supported: {}", supported)?;
    writeln!(out, "custom:    {}", custom)?;

    let matching: Vec<UrlPattern> = registry
        .all_url_patterns()
        .await
        .iter()
        .filter_map(|p| p.parse::<UrlPattern>().ok())
        .filter(|p| p.matches(&url))
        .collect();
    for pattern in &matching {
        writeln!(out, "matched:   {}", pattern)?;
    }

    Ok(supported)
}

/// `grants`: origins recorded in the granted-origins ledger.
pub async fn list_grants<W: Write>(permissions: &LedgerPermissions, out: &mut W) -> Result<()> {
    let granted = permissions.granted().await?;
    if granted.is_empty() {
        writeln!(out, "No origins granted")?;
    }
    for origin in granted {
        writeln!(out, "{}", origin)?;
    }
    Ok(())
}

/// `prune --keep <n>`: trims the shared change log.
pub fn prune_changes<W: Write>(db: &Database, keep: u32, out: &mut W) -> Result<u64> {
    let deleted = db.prune_changes(keep)?;
    info!(deleted, keep, "Pruned change log");
    writeln!(out, "Pruned {} change record(s)", deleted)?;
    Ok(deleted)
}

/// `watch`: prints the current config, then every change until `shutdown`
/// resolves.
pub async fn watch<W, F>(registry: &DomainRegistry, out: W, shutdown: F) -> Result<()>
where
    W: Write + Send + 'static,
    F: Future<Output = ()>,
{
    let out = Arc::new(parking_lot::Mutex::new(out));

    let current = registry.config().await;
    writeln!(out.lock(), "{}", describe(&current))?;

    let sink = Arc::clone(&out);
    let subscription = registry.on_domain_config_change(move |config| {
        let mut out = sink.lock();
        if let Err(e) = writeln!(out, "{}", describe(config)) {
            warn!("Failed to write config change: {}", e);
        }
    });

    shutdown.await;
    subscription.unsubscribe();
    Ok(())
}

fn describe(config: &DomainConfig) -> String {
    if config.custom_domains.is_empty() {
        return "custom domains: (none)".to_string();
    }
    let names: Vec<&str> = config.custom_domains.iter().map(|d| d.as_str()).collect();
    format!("custom domains: {}", names.join(", "))
}

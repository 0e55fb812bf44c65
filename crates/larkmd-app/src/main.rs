//! larkmd - manage the sites the Lark/Feishu Markdown exporter runs on.
//!
//! Every invocation opens the shared SQLite database, so several `larkmd`
//! processes (a `watch`, a `serve`, one-off edits) act as separate execution
//! contexts over the same configuration.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use larkmd_app::{commands, GrantMode};
use larkmd_core::{DomainRegistry, LedgerPermissions, StorageBackend};
use larkmd_server::{AppState, Server, ServerConfig};
use larkmd_storage::{Database, SqliteStorage};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// larkmd - custom domain allow-list for the Lark/Feishu Markdown exporter
#[derive(Parser, Debug)]
#[command(name = "larkmd", version, about)]
struct Args {
    /// Database file (default: platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Context identifier recorded on writes
    #[arg(long, global = true, default_value = "cli")]
    instance: String,

    /// How permission requests are answered
    #[arg(long, global = true, value_enum, default_value_t = GrantMode::Prompt)]
    grant: GrantMode,

    /// Change log poll interval in milliseconds
    #[arg(long, global = true, default_value_t = 500)]
    poll_ms: u64,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List, add or remove custom domains
    Domains {
        #[command(subcommand)]
        action: DomainsCommand,
    },
    /// Print the match patterns for all supported domains
    Patterns,
    /// Check whether a URL is supported
    Check { url: String },
    /// List granted origins
    Grants,
    /// Print configuration changes as they happen
    Watch,
    /// Run the HTTP API for the options page
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8767")]
        addr: SocketAddr,
    },
    /// Trim the change log
    Prune {
        /// Number of most recent change records to keep
        #[arg(long, default_value_t = 1000)]
        keep: u32,
    },
}

#[derive(Subcommand, Debug)]
enum DomainsCommand {
    /// List built-in and custom domains
    List,
    /// Add a custom domain
    Add { domain: String },
    /// Remove a custom domain
    Remove { domain: String },
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "larkmd", "larkmd").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation. Console output goes to stderr so
/// command output on stdout stays clean.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("larkmd={},warn", log_level)));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("larkmd")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stderr))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::debug!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    // Fallback: console logging only
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::warn!("File logging unavailable, using console only");
    None
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Keep guard alive for the duration of the program
    let _log_guard = init_logging(&args);
    tracing::debug!("Args: {:?}", args);

    let db = match &args.db {
        Some(path) => Database::with_path(path)?,
        None => Database::new()?,
    };
    let db = Arc::new(db);

    let storage: Arc<dyn StorageBackend> = Arc::new(SqliteStorage::with_poll_interval(
        Arc::clone(&db),
        args.instance.clone(),
        Duration::from_millis(args.poll_ms),
    ));
    let permissions = Arc::new(LedgerPermissions::new(
        Arc::clone(&storage),
        args.grant.policy(),
    ));
    let registry = Arc::new(DomainRegistry::new(storage, permissions.clone()));

    let mut out = std::io::stdout();
    let success = match args.command {
        Command::Domains { action } => match action {
            DomainsCommand::List => {
                commands::list_domains(&registry, &mut out).await?;
                true
            }
            DomainsCommand::Add { domain } => {
                commands::add_domain(&registry, &domain, &mut out).await?
            }
            DomainsCommand::Remove { domain } => {
                commands::remove_domain(&registry, &domain, &mut out).await?
            }
        },
        Command::Patterns => {
            commands::list_patterns(&registry, &mut out).await?;
            true
        }
        Command::Check { url } => commands::check_url(&registry, &url, &mut out).await?,
        Command::Grants => {
            commands::list_grants(&permissions, &mut out).await?;
            true
        }
        Command::Watch => {
            tracing::info!(instance = %args.instance, "Watching domain configuration");
            commands::watch(&registry, std::io::stdout(), async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                }
            })
            .await?;
            true
        }
        Command::Serve { addr } => {
            let server = Server::new(ServerConfig::from_addr(addr), AppState::new(registry))?;
            tracing::debug!(addr = %server.addr(), "API server configured");
            tokio::select! {
                result = server.run() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down API server"),
            }
            true
        }
        Command::Prune { keep } => {
            commands::prune_changes(&db, keep, &mut out)?;
            true
        }
    };

    Ok(exit_code(success))
}

#[cfg(test)]
mod tests {
    use clap::error::ErrorKind;
    use clap::Parser;

    use super::{Args, Command};

    #[test]
    fn prune_keep_parses_unsigned() {
        let args = Args::try_parse_from(["larkmd", "prune", "--keep", "0"]).unwrap();
        assert!(matches!(args.command, Command::Prune { keep: 0 }));
    }

    #[test]
    fn prune_rejects_negative_keep() {
        let err = match Args::try_parse_from(["larkmd", "prune", "--keep=-1"]) {
            Ok(_) => panic!("expected negative keep to be rejected"),
            Err(err) => err,
        };
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}

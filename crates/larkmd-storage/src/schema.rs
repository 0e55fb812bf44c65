//! Database schema and migrations.

use rusqlite::Connection;
use tracing::info;

use crate::error::Result;

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < SCHEMA_VERSION {
        info!(
            "Running migrations from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        if current_version < 1 {
            migrate_v1(conn)?;
        }

        if current_version < 2 {
            migrate_v2(conn)?;
        }

        set_schema_version(conn, SCHEMA_VERSION)?;
        info!("Migrations complete");
    }

    Ok(())
}

/// Get the current schema version.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: partitioned key/value storage.
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Applying migration v1: Key/value storage");

    // One row per (area, key); values are JSON text
    conn.execute(
        "CREATE TABLE IF NOT EXISTS storage_items (
            area TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_by TEXT,
            PRIMARY KEY (area, key)
        )",
        [],
    )?;

    Ok(())
}

/// Migration to version 2: change log for cross-process notifications.
fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Applying migration v2: Change log");

    // value is NULL when the key was removed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS storage_changes (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            area TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT,
            changed_at TEXT NOT NULL DEFAULT (datetime('now')),
            changed_by TEXT
        )",
        [],
    )?;

    // Index for efficient polling (WHERE seq > last_seen)
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_storage_changes_seq ON storage_changes (seq)",
        [],
    )?;

    Ok(())
}

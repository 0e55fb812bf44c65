//! Key/value items and the change log.
//!
//! Every write to `storage_items` appends a row to `storage_changes` in the
//! same transaction, so a process polling the change log never misses a
//! write made by another process.

use chrono::{DateTime, Utc};
use larkmd_core::StorageArea;
use rusqlite::{params, OptionalExtension, Row};

use crate::database::Database;
use crate::error::Result;
use crate::models::{ChangeRecord, StoredItem};

impl Database {
    // ==================== Items ====================

    /// Get an item by area and key.
    pub fn get_item(&self, area: StorageArea, key: &str) -> Result<Option<StoredItem>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT value, updated_at, updated_by FROM storage_items WHERE area = ?1 AND key = ?2",
                params![area.as_str(), key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((value, updated_at, updated_by)) => Ok(Some(StoredItem {
                area,
                key: key.to_string(),
                value: serde_json::from_str(&value)?,
                updated_at: parse_datetime(&updated_at),
                updated_by,
            })),
            None => Ok(None),
        }
    }

    /// Get just the value of an item.
    pub fn get_value(&self, area: StorageArea, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.get_item(area, key)?.map(|item| item.value))
    }

    /// Set an item (insert or replace) and record the change.
    pub fn set_item(
        &self,
        area: StorageArea,
        key: &str,
        value: &serde_json::Value,
        updated_by: &str,
    ) -> Result<i64> {
        let conn = self.pool.get()?;
        let json = serde_json::to_string(value)?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO storage_items (area, key, value, updated_at, updated_by) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![area.as_str(), key, json, now, updated_by],
        )?;
        tx.execute(
            "INSERT INTO storage_changes (area, key, value, changed_at, changed_by) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![area.as_str(), key, json, now, updated_by],
        )?;
        let seq = tx.last_insert_rowid();
        tx.commit()?;

        Ok(seq)
    }

    /// Remove an item. Records a change only if the item existed.
    /// Returns true if an item was removed.
    pub fn remove_item(&self, area: StorageArea, key: &str, updated_by: &str) -> Result<bool> {
        let conn = self.pool.get()?;
        let now = Utc::now().to_rfc3339();

        let tx = conn.unchecked_transaction()?;
        let deleted = tx.execute(
            "DELETE FROM storage_items WHERE area = ?1 AND key = ?2",
            params![area.as_str(), key],
        )?;
        if deleted > 0 {
            tx.execute(
                "INSERT INTO storage_changes (area, key, value, changed_at, changed_by) VALUES (?1, ?2, NULL, ?3, ?4)",
                params![area.as_str(), key, now, updated_by],
            )?;
        }
        tx.commit()?;

        Ok(deleted > 0)
    }

    /// All items in an area, ordered by key.
    pub fn get_items(&self, area: StorageArea) -> Result<Vec<StoredItem>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT key, value, updated_at, updated_by FROM storage_items WHERE area = ?1 ORDER BY key",
        )?;

        let rows = stmt
            .query_map(params![area.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut items = Vec::with_capacity(rows.len());
        for (key, value, updated_at, updated_by) in rows {
            items.push(StoredItem {
                area,
                key,
                value: serde_json::from_str(&value)?,
                updated_at: parse_datetime(&updated_at),
                updated_by,
            });
        }
        Ok(items)
    }

    // ==================== Change Log ====================

    /// Get the latest change sequence number.
    pub fn get_latest_change_seq(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        let seq: Option<i64> = conn
            .query_row("SELECT MAX(seq) FROM storage_changes", [], |row| row.get(0))
            .optional()?
            .flatten();
        Ok(seq.unwrap_or(0))
    }

    /// Get changes after a given sequence number, oldest first.
    ///
    /// Rows with an unknown area are skipped.
    pub fn get_changes_since(&self, since_seq: i64) -> Result<Vec<ChangeRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT seq, area, key, value, changed_at, changed_by FROM storage_changes WHERE seq > ?1 ORDER BY seq",
        )?;

        let changes = stmt
            .query_map(params![since_seq], change_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        Ok(changes)
    }

    /// Delete all but the newest `keep_count` change rows.
    /// Returns the number of rows deleted.
    pub fn prune_changes(&self, keep_count: u32) -> Result<u64> {
        let conn = self.pool.get()?;

        let threshold: Option<i64> = conn
            .query_row(
                "SELECT seq FROM storage_changes ORDER BY seq DESC LIMIT 1 OFFSET ?1",
                params![i64::from(keep_count)],
                |row| row.get(0),
            )
            .optional()?;

        match threshold {
            Some(threshold_seq) => {
                let deleted = conn.execute(
                    "DELETE FROM storage_changes WHERE seq <= ?1",
                    params![threshold_seq],
                )?;
                Ok(deleted as u64)
            }
            None => Ok(0),
        }
    }
}

fn change_from_row(row: &Row<'_>) -> rusqlite::Result<Option<ChangeRecord>> {
    let area: String = row.get(1)?;
    let Some(area) = StorageArea::parse(&area) else {
        return Ok(None);
    };
    let value: Option<String> = row.get(3)?;
    let changed_at: String = row.get(4)?;

    Ok(Some(ChangeRecord {
        seq: row.get(0)?,
        area,
        key: row.get(2)?,
        // Unparseable payloads surface as removals
        value: value.and_then(|v| serde_json::from_str(&v).ok()),
        changed_at: parse_datetime(&changed_at),
        changed_by: row.get(5)?,
    }))
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

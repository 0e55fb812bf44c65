//! Row models.

use chrono::{DateTime, Utc};
use larkmd_core::StorageArea;
use serde::{Deserialize, Serialize};

/// A stored key/value pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredItem {
    pub area: StorageArea,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

/// A row of the change log.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    pub seq: i64,
    pub area: StorageArea,
    pub key: String,
    /// New value, `None` when the key was removed.
    pub value: Option<serde_json::Value>,
    pub changed_at: DateTime<Utc>,
    pub changed_by: Option<String>,
}

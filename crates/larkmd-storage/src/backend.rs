//! [`StorageBackend`] over SQLite.
//!
//! ## Architecture
//!
//! ```text
//! set/remove ──▶ storage_items + storage_changes (one transaction)
//!                                 │
//!           (any process)         ▼  poll every interval, seq > last_seq
//!                          SqliteStorage poller ──▶ broadcast ──▶ changes()
//! ```
//!
//! Every process, including the writer itself, learns about changes from the
//! change log, so delivery is uniform and always asynchronous to the write.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use larkmd_core::{BackendError, StorageArea, StorageBackend, StorageChange};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::database::Database;

/// Default poll interval for the change log.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Capacity of the change broadcast channel.
const CHANNEL_CAPACITY: usize = 256;

/// SQLite-backed storage shared between processes through one database file.
pub struct SqliteStorage {
    db: Arc<Database>,
    /// Identifier recorded as the author of writes.
    instance_id: String,
    /// Last change-log sequence number forwarded to subscribers.
    last_seq: Arc<AtomicI64>,
    poll_interval: Duration,
    changes_tx: broadcast::Sender<StorageChange>,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("instance_id", &self.instance_id)
            .field("last_seq", &self.last_seq.load(Ordering::Relaxed))
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl SqliteStorage {
    /// Creates a backend over `db`. Only changes made after this call are
    /// forwarded to subscribers.
    pub fn new(db: Arc<Database>, instance_id: impl Into<String>) -> Self {
        let last_seq = db.get_latest_change_seq().unwrap_or_else(|e| {
            warn!("Failed to read change log position: {}", e);
            0
        });
        let (changes_tx, _) = broadcast::channel(CHANNEL_CAPACITY);

        Self {
            db,
            instance_id: instance_id.into(),
            last_seq: Arc::new(AtomicI64::new(last_seq)),
            poll_interval: DEFAULT_POLL_INTERVAL,
            changes_tx,
            poller: Mutex::new(None),
        }
    }

    /// Creates a backend with a custom poll interval.
    pub fn with_poll_interval(
        db: Arc<Database>,
        instance_id: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        let mut storage = Self::new(db, instance_id);
        storage.poll_interval = poll_interval;
        storage
    }

    /// Returns the underlying database.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Forwards pending change-log rows to subscribers.
    /// Returns the number of changes forwarded.
    pub fn poll_now(&self) -> usize {
        poll_changes(&self.db, &self.last_seq, &self.changes_tx)
    }

    fn ensure_polling(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; storage change stream will only advance on poll_now()");
            return;
        };

        let db = Arc::clone(&self.db);
        let last_seq = Arc::clone(&self.last_seq);
        let tx = self.changes_tx.clone();
        let interval = self.poll_interval;

        *poller = Some(runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                poll_changes(&db, &last_seq, &tx);
            }
        }));
        debug!(?interval, "Started storage change poller");
    }
}

fn poll_changes(
    db: &Database,
    last_seq: &AtomicI64,
    tx: &broadcast::Sender<StorageChange>,
) -> usize {
    let since = last_seq.load(Ordering::SeqCst);
    let changes = match db.get_changes_since(since) {
        Ok(changes) => changes,
        Err(e) => {
            warn!("Failed to poll for storage changes: {}", e);
            return 0;
        }
    };

    let mut forwarded = 0;
    for change in changes {
        last_seq.store(change.seq, Ordering::SeqCst);
        // No subscribers is fine
        let _ = tx.send(StorageChange {
            area: change.area,
            key: change.key,
            new_value: change.value,
        });
        forwarded += 1;
    }
    forwarded
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    async fn get(&self, area: StorageArea, key: &str) -> larkmd_core::Result<Option<Value>> {
        Ok(self.db.get_value(area, key)?)
    }

    async fn set(&self, area: StorageArea, key: &str, value: Value) -> larkmd_core::Result<()> {
        self.db
            .set_item(area, key, &value, &self.instance_id)
            .map_err(BackendError::from)?;
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> larkmd_core::Result<()> {
        self.db
            .remove_item(area, key, &self.instance_id)
            .map_err(BackendError::from)?;
        Ok(())
    }

    fn changes(&self) -> broadcast::Receiver<StorageChange> {
        let rx = self.changes_tx.subscribe();
        self.ensure_polling();
        rx
    }
}

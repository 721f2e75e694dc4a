pub mod keys;
pub mod operations;
pub mod snapshot;
#[cfg(test)]
pub(crate) mod testing;
pub mod trees;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use sled::transaction::TransactionError;
use sled::Db;
use thiserror::Error;

pub use keys::{Collection, StorePath};
pub use operations::session_logs::{Message, StoredMessage};
pub use snapshot::Snapshot;

/// Path -> new value. `None` deletes the path (and, for a session log, its whole subtree).
pub type StoreUpdates = BTreeMap<StorePath, Option<Value>>;

#[derive(Debug)]
pub struct Store {
    db: Db,
    pub session_timestamps: sled::Tree,
    pub sessions: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("invalid store path: {0}")]
    InvalidPath(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("transaction aborted: {0}")]
    TransactionAborted(String),
}

/// The operations the session core needs from a hierarchical key-value store.
///
/// `Store` is the sled-backed implementation; the allocator and sweeper only see this trait,
/// so a single long-lived client is built at startup and handed to both.
pub trait SessionStore: Send + Sync {
    /// Point-in-time read of a whole collection.
    fn read_all(&self, collection: Collection) -> Result<Snapshot, StoreError>;

    fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Apply every update in one transaction: all of them land or none do.
    fn atomic_multi_update(&self, updates: StoreUpdates) -> Result<(), StoreError>;

    /// Like [`SessionStore::atomic_multi_update`], but only commits while `guard` is absent.
    /// Returns `false` without writing anything when `guard` already exists.
    fn atomic_multi_update_if_absent(
        &self,
        guard: &StorePath,
        updates: StoreUpdates,
    ) -> Result<bool, StoreError>;

    /// A fresh key for a log entry; keys sort in generation order.
    fn next_push_id(&self) -> Result<String, StoreError>;

    fn read_log(&self, code: &str) -> Result<Vec<StoredMessage>, StoreError>;

    /// Append to a live session's log. Fails with `NotFound` once the session is gone.
    fn append_message(&self, code: &str, message: &Message) -> Result<StoredMessage, StoreError>;
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let session_timestamps = db.open_tree(trees::SESSION_TIMESTAMPS)?;
        let sessions = db.open_tree(trees::SESSIONS)?;

        Ok(Self {
            db,
            session_timestamps,
            sessions,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn size_on_disk(&self) -> Result<u64, StoreError> {
        Ok(self.db.size_on_disk()?)
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

pub(crate) fn map_transaction_error(e: TransactionError<StoreError>) -> StoreError {
    match e {
        TransactionError::Abort(inner) => inner,
        TransactionError::Storage(se) => StoreError::Sled(se),
    }
}

impl SessionStore for Store {
    fn read_all(&self, collection: Collection) -> Result<Snapshot, StoreError> {
        match collection {
            Collection::SessionTimestamps => self.timestamp_snapshot(),
            Collection::Sessions => self.log_snapshot(),
        }
    }

    fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.get_path(path)
    }

    fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let mut updates = StoreUpdates::new();
        updates.insert(path.clone(), Some(value));
        self.apply_updates(None, updates).map(|_| ())
    }

    fn atomic_multi_update(&self, updates: StoreUpdates) -> Result<(), StoreError> {
        self.apply_updates(None, updates).map(|_| ())
    }

    fn atomic_multi_update_if_absent(
        &self,
        guard: &StorePath,
        updates: StoreUpdates,
    ) -> Result<bool, StoreError> {
        self.apply_updates(Some(guard), updates)
    }

    fn next_push_id(&self) -> Result<String, StoreError> {
        Ok(keys::push_id(self.db.generate_id()?))
    }

    fn read_log(&self, code: &str) -> Result<Vec<StoredMessage>, StoreError> {
        self.session_log(code)
    }

    fn append_message(&self, code: &str, message: &Message) -> Result<StoredMessage, StoreError> {
        let push_id = self.next_push_id()?;
        self.append_session_message(code, &push_id, message)
    }
}

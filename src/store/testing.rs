//! Store wrappers for exercising failure and race paths in unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::store::{
    Collection, Message, SessionStore, Snapshot, Store, StoreError, StorePath, StoreUpdates,
    StoredMessage,
};

/// Wraps a real store, counting writes and optionally failing or serving stale reads.
pub struct ProbeStore<'a> {
    inner: &'a Store,
    writes: AtomicUsize,
    fail_updates: bool,
    stale_reads: bool,
}

impl<'a> ProbeStore<'a> {
    pub fn new(inner: &'a Store) -> Self {
        Self {
            inner,
            writes: AtomicUsize::new(0),
            fail_updates: false,
            stale_reads: false,
        }
    }

    /// Every write and multi-update fails as if the store were unreachable.
    pub fn failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    /// `read_all` returns an empty snapshot, as if taken before another allocator's write.
    pub fn stale_reads(mut self) -> Self {
        self.stale_reads = true;
        self
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_updates {
            return Err(StoreError::TransactionAborted("store unavailable".to_string()));
        }
        Ok(())
    }
}

impl SessionStore for ProbeStore<'_> {
    fn read_all(&self, collection: Collection) -> Result<Snapshot, StoreError> {
        if self.stale_reads {
            return Ok(Snapshot::default());
        }
        self.inner.read_all(collection)
    }

    fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.inner.get(path)
    }

    fn write(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.record_write()?;
        self.inner.write(path, value)
    }

    fn atomic_multi_update(&self, updates: StoreUpdates) -> Result<(), StoreError> {
        self.record_write()?;
        self.inner.atomic_multi_update(updates)
    }

    fn atomic_multi_update_if_absent(
        &self,
        guard: &StorePath,
        updates: StoreUpdates,
    ) -> Result<bool, StoreError> {
        self.record_write()?;
        self.inner.atomic_multi_update_if_absent(guard, updates)
    }

    fn next_push_id(&self) -> Result<String, StoreError> {
        self.inner.next_push_id()
    }

    fn read_log(&self, code: &str) -> Result<Vec<StoredMessage>, StoreError> {
        self.inner.read_log(code)
    }

    fn append_message(&self, code: &str, message: &Message) -> Result<StoredMessage, StoreError> {
        self.record_write()?;
        self.inner.append_message(code, message)
    }
}

pub fn open_store(name: &str) -> (tempfile::TempDir, Store) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Store::open(dir.path().join(name).to_str().expect("path")).expect("open store");
    (dir, store)
}

/// Seed a live session directly, bypassing the allocator.
pub fn seed_session(store: &Store, code: &str, created_at: i64) {
    store
        .session_timestamps
        .insert(code.as_bytes(), serde_json::to_vec(&created_at).expect("encode"))
        .expect("insert timestamp");
    store
        .append_message(code, &Message::session_start(created_at))
        .expect("seed log");
}

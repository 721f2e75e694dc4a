use serde_json::Value;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use crate::store::keys::{self, StorePath};
use crate::store::operations::session_logs::Message;
use crate::store::{map_transaction_error, Snapshot, Store, StoreError, StoreUpdates};

enum PlannedOp {
    Timestamp { key: Vec<u8>, value: Option<Vec<u8>> },
    Message { key: Vec<u8>, value: Option<Vec<u8>> },
}

impl Store {
    pub fn session_count(&self) -> usize {
        self.session_timestamps.len()
    }

    pub(crate) fn timestamp_snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut children = Vec::with_capacity(self.session_timestamps.len());
        for item in self.session_timestamps.iter() {
            let (k, v) = item?;
            let code = String::from_utf8_lossy(&k).into_owned();
            children.push((code, decode_value(&v)));
        }
        Ok(children.into_iter().collect())
    }

    pub(crate) fn get_path(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        match path {
            StorePath::SessionTimestamp(code) => {
                let key = keys::session_timestamp_key(code);
                Ok(self
                    .session_timestamps
                    .get(key.as_bytes())?
                    .map(|raw| decode_value(&raw)))
            }
            StorePath::SessionMessage(code, push_id) => {
                let key = keys::session_message_key(code, push_id);
                Ok(self.sessions.get(key.as_bytes())?.map(|raw| decode_value(&raw)))
            }
            StorePath::SessionLog(code) => {
                let mut entries = serde_json::Map::new();
                for item in self.sessions.scan_prefix(keys::session_log_prefix(code).as_bytes()) {
                    let (k, v) = item?;
                    if let Some((_, push_id)) = keys::split_message_key(&k) {
                        entries.insert(push_id, decode_value(&v));
                    }
                }
                if entries.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(Value::Object(entries)))
                }
            }
        }
    }

    /// Apply a batch of path updates in a single sled transaction across both trees.
    ///
    /// With a `guard`, the batch only commits while that timestamp entry is absent; the check
    /// and the writes share one transaction.
    pub(crate) fn apply_updates(
        &self,
        guard: Option<&StorePath>,
        updates: StoreUpdates,
    ) -> Result<bool, StoreError> {
        let guard_key = match guard {
            None => None,
            Some(StorePath::SessionTimestamp(code)) => {
                Some(keys::session_timestamp_key(code).into_bytes())
            }
            Some(other) => {
                return Err(StoreError::InvalidPath(format!(
                    "guard must be a session timestamp, got {other}"
                )))
            }
        };

        let mut ops = Vec::with_capacity(updates.len());
        let mut cleared_logs = Vec::new();
        for (path, value) in &updates {
            match path {
                StorePath::SessionTimestamp(code) => {
                    let value = value.as_ref().map(Self::serialize).transpose()?;
                    ops.push(PlannedOp::Timestamp {
                        key: keys::session_timestamp_key(code).into_bytes(),
                        value,
                    });
                }
                StorePath::SessionMessage(code, push_id) => {
                    let value = value.as_ref().map(encode_message).transpose()?;
                    ops.push(PlannedOp::Message {
                        key: keys::session_message_key(code, push_id).into_bytes(),
                        value,
                    });
                }
                StorePath::SessionLog(code) => {
                    // Setting a subtree replaces it, so existing entries go first.
                    for item in self.sessions.scan_prefix(keys::session_log_prefix(code).as_bytes()) {
                        let (k, _) = item?;
                        ops.push(PlannedOp::Message {
                            key: k.to_vec(),
                            value: None,
                        });
                    }
                    match value {
                        None => cleared_logs.push(code.clone()),
                        Some(Value::Object(entries)) => {
                            for (push_id, entry) in entries {
                                ops.push(PlannedOp::Message {
                                    key: keys::session_message_key(code, push_id).into_bytes(),
                                    value: Some(encode_message(entry)?),
                                });
                            }
                        }
                        Some(_) => {
                            return Err(StoreError::Validation(format!(
                                "{path} must be an object keyed by push id"
                            )))
                        }
                    }
                }
            }
        }

        let committed = (&self.session_timestamps, &self.sessions)
            .transaction(
                |(timestamps, logs)| -> ConflictableTransactionResult<bool, StoreError> {
                    if let Some(key) = &guard_key {
                        if timestamps.get(key.as_slice())?.is_some() {
                            return Ok(false);
                        }
                    }
                    for op in &ops {
                        match op {
                            PlannedOp::Timestamp { key, value: Some(v) } => {
                                timestamps.insert(key.as_slice(), v.as_slice())?;
                            }
                            PlannedOp::Timestamp { key, value: None } => {
                                timestamps.remove(key.as_slice())?;
                            }
                            PlannedOp::Message { key, value: Some(v) } => {
                                logs.insert(key.as_slice(), v.as_slice())?;
                            }
                            PlannedOp::Message { key, value: None } => {
                                logs.remove(key.as_slice())?;
                            }
                        }
                    }
                    Ok(true)
                },
            )
            .map_err(map_transaction_error)?;

        // Committed deletes stand even when the cleanup below fails.
        if committed {
            for code in &cleared_logs {
                if let Err(e) = self.purge_log_stragglers(code) {
                    tracing::error!(code = %code, error = %e, "Failed to purge session log leftovers");
                }
            }
        }

        Ok(committed)
    }
}

/// Stored bytes that are not valid JSON surface as a string so readers can skip them.
fn decode_value(raw: &[u8]) -> Value {
    serde_json::from_slice(raw)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(raw).into_owned()))
}

fn encode_message(value: &Value) -> Result<Vec<u8>, StoreError> {
    let message: Message = serde_json::from_value(value.clone())?;
    Store::serialize(&message)
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sled::transaction::ConflictableTransactionResult;
use sled::Transactional;

use crate::constants::{SESSION_START_MSG, SYSTEM_USER};
use crate::store::keys;
use crate::store::{map_transaction_error, Snapshot, Store, StoreError};

/// One entry of a session log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub user: String,
    pub msg: String,
    /// Serialized dice roll, empty for plain messages.
    pub roll: String,
    pub timestamp: i64,
    pub user_id: String,
}

impl Message {
    /// The synthetic entry every new session log starts with.
    pub fn session_start(timestamp: i64) -> Self {
        Self {
            user: SYSTEM_USER.to_string(),
            msg: SESSION_START_MSG.to_string(),
            roll: String::new(),
            timestamp,
            user_id: SYSTEM_USER.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    pub id: String,
    #[serde(flatten)]
    pub message: Message,
}

impl Store {
    pub(crate) fn log_snapshot(&self) -> Result<Snapshot, StoreError> {
        let mut grouped: BTreeMap<String, serde_json::Map<String, Value>> = BTreeMap::new();
        for item in self.sessions.iter() {
            let (k, v) = item?;
            let Some((code, push_id)) = keys::split_message_key(&k) else {
                tracing::warn!(key = %String::from_utf8_lossy(&k), "Skipping malformed session log key");
                continue;
            };
            let value = serde_json::from_slice(&v)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&v).into_owned()));
            grouped.entry(code).or_default().insert(push_id, value);
        }

        Ok(grouped
            .into_iter()
            .map(|(code, entries)| (code, Value::Object(entries)))
            .collect())
    }

    pub(crate) fn session_log(&self, code: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let prefix = keys::session_log_prefix(code);
        let mut messages = Vec::new();
        for item in self.sessions.scan_prefix(prefix.as_bytes()) {
            let (k, v) = item?;
            let Some((_, push_id)) = keys::split_message_key(&k) else {
                continue;
            };
            match Self::deserialize::<Message>(&v) {
                Ok(message) => messages.push(StoredMessage {
                    id: push_id,
                    message,
                }),
                Err(e) => {
                    tracing::warn!(code, push_id = %push_id, error = %e, "Skipping unreadable log entry");
                }
            }
        }
        Ok(messages)
    }

    /// Insert one log entry, refusing when the session's timestamp entry is gone.
    /// The existence check and the insert run in one transaction, so a concurrent sweep
    /// either sees this entry or makes the append fail.
    pub(crate) fn append_session_message(
        &self,
        code: &str,
        push_id: &str,
        message: &Message,
    ) -> Result<StoredMessage, StoreError> {
        let ts_key = keys::session_timestamp_key(code).into_bytes();
        let msg_key = keys::session_message_key(code, push_id).into_bytes();
        let bytes = Self::serialize(message)?;

        (&self.session_timestamps, &self.sessions)
            .transaction(
                |(timestamps, logs)| -> ConflictableTransactionResult<(), StoreError> {
                    if timestamps.get(ts_key.as_slice())?.is_none() {
                        return sled::transaction::abort(StoreError::NotFound {
                            entity: "session".to_string(),
                            key: code.to_string(),
                        });
                    }
                    logs.insert(msg_key.as_slice(), bytes.as_slice())?;
                    Ok(())
                },
            )
            .map_err(map_transaction_error)?;

        Ok(StoredMessage {
            id: push_id.to_string(),
            message: message.clone(),
        })
    }

    /// Remove log entries appended between a sweep's prefix scan and its commit.
    /// Each removal re-checks the timestamp entry in the same transaction, so a code that
    /// was allocated again keeps its new log.
    pub(crate) fn purge_log_stragglers(&self, code: &str) -> Result<usize, StoreError> {
        let ts_key = keys::session_timestamp_key(code).into_bytes();
        let stale: Vec<sled::IVec> = self
            .sessions
            .scan_prefix(keys::session_log_prefix(code).as_bytes())
            .keys()
            .collect::<Result<_, _>>()?;

        let mut purged = 0;
        for key in stale {
            let outcome = (&self.session_timestamps, &self.sessions)
                .transaction(
                    |(timestamps, logs)| -> ConflictableTransactionResult<Option<bool>, StoreError> {
                        if timestamps.get(ts_key.as_slice())?.is_some() {
                            return Ok(None);
                        }
                        Ok(Some(logs.remove(key.as_ref())?.is_some()))
                    },
                )
                .map_err(map_transaction_error)?;
            match outcome {
                Some(removed) => purged += usize::from(removed),
                None => break,
            }
        }
        if purged > 0 {
            tracing::warn!(code, purged, "Purged log entries left behind by a concurrent append");
        }
        Ok(purged)
    }
}

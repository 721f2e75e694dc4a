use serde_json::Value;
use thiserror::Error;

use crate::config::SessionConfig;
use crate::session::code::SessionCode;
use crate::store::{Collection, Message, SessionStore, StoreError, StorePath, StoreUpdates};

pub const STATE_CREATED: i32 = 0;
pub const STATE_CAPACITY_EXCEEDED: i32 = -1;
pub const STATE_ALLOCATION_EXHAUSTED: i32 = -2;
pub const STATE_STORE_UNAVAILABLE: i32 = -3;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("Session number exceeded maximum of {max}.")]
    CapacityExceeded { max: usize },
    #[error("Could not generate unique session number.")]
    AllocationExhausted { attempts: u32 },
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl AllocationError {
    /// Numeric `state` reported in the HTTP envelope.
    pub fn state_code(&self) -> i32 {
        match self {
            Self::CapacityExceeded { .. } => STATE_CAPACITY_EXCEEDED,
            Self::AllocationExhausted { .. } => STATE_ALLOCATION_EXHAUSTED,
            Self::Store(_) => STATE_STORE_UNAVAILABLE,
        }
    }
}

/// Reserve a fresh session code and seed its log with the start message.
pub fn create_session<S>(
    store: &S,
    config: &SessionConfig,
    now: i64,
) -> Result<SessionCode, AllocationError>
where
    S: SessionStore + ?Sized,
{
    let mut rng = rand::thread_rng();
    create_session_with(store, config, now, || SessionCode::generate(&mut rng))
}

/// [`create_session`] with an explicit candidate source.
///
/// The index is read once; candidates are checked against that snapshot. The index entry and
/// the start message are then written in one guarded multi-path update, so a code claimed by
/// a concurrent allocation since the snapshot is treated as another collision instead of
/// being overwritten.
pub fn create_session_with<S, F>(
    store: &S,
    config: &SessionConfig,
    now: i64,
    mut next_code: F,
) -> Result<SessionCode, AllocationError>
where
    S: SessionStore + ?Sized,
    F: FnMut() -> SessionCode,
{
    let snapshot = store.read_all(Collection::SessionTimestamps)?;
    let live = snapshot.num_children();
    if live >= config.max_sessions {
        tracing::warn!(live, max = config.max_sessions, "Session capacity reached");
        return Err(AllocationError::CapacityExceeded {
            max: config.max_sessions,
        });
    }

    for attempt in 1..=config.max_retry {
        let candidate = next_code();
        if snapshot.exists(candidate.as_str()) {
            tracing::debug!(code = %candidate, attempt, "Session code collides with a live session");
            continue;
        }

        let guard = StorePath::SessionTimestamp(candidate.to_string());
        let updates = seed_updates(store, &candidate, now)?;
        if store.atomic_multi_update_if_absent(&guard, updates)? {
            tracing::info!(code = %candidate, attempt, live = live + 1, "Session created");
            return Ok(candidate);
        }

        tracing::warn!(code = %candidate, attempt, "Session code claimed concurrently");
    }

    tracing::warn!(attempts = config.max_retry, "Could not allocate a unique session code");
    Err(AllocationError::AllocationExhausted {
        attempts: config.max_retry,
    })
}

fn seed_updates<S>(store: &S, code: &SessionCode, now: i64) -> Result<StoreUpdates, StoreError>
where
    S: SessionStore + ?Sized,
{
    let push_id = store.next_push_id()?;
    let start = serde_json::to_value(Message::session_start(now))?;

    let mut updates = StoreUpdates::new();
    updates.insert(
        StorePath::SessionTimestamp(code.to_string()),
        Some(Value::from(now)),
    );
    updates.insert(
        StorePath::SessionMessage(code.to_string(), push_id),
        Some(start),
    );
    Ok(updates)
}

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::code::SessionCode;
use crate::session::dice::{DiceCounts, DiceError, DiceTable};
use crate::store::{Message, SessionStore, StoreError, StorePath, StoredMessage};
use crate::validation::{validate_display_name, validate_message_text, validate_user_id};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("{0}")]
    Invalid(String),
    #[error(transparent)]
    Dice(#[from] DiceError),
    #[error(transparent)]
    Store(StoreError),
}

impl LogError {
    fn from_store(code: &SessionCode, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::SessionNotFound(code.to_string()),
            other => Self::Store(other),
        }
    }
}

/// A participant's post: free text plus either dice to roll or an already rolled payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessage {
    pub user: String,
    pub user_id: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub dice: Option<DiceCounts>,
    #[serde(default)]
    pub roll: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub code: String,
    /// `None` when the stored timestamp is unreadable.
    pub created_at: Option<i64>,
    pub expires_at: Option<i64>,
    pub messages: Vec<StoredMessage>,
}

pub fn post_message<S, R>(
    store: &S,
    code: &SessionCode,
    request: PostMessage,
    now: i64,
    rng: &mut R,
) -> Result<StoredMessage, LogError>
where
    S: SessionStore + ?Sized,
    R: Rng + ?Sized,
{
    validate_display_name(&request.user).map_err(|e| LogError::Invalid(e.to_string()))?;
    validate_user_id(&request.user_id).map_err(|e| LogError::Invalid(e.to_string()))?;
    validate_message_text(&request.msg).map_err(|e| LogError::Invalid(e.to_string()))?;

    let roll = match (request.dice, request.roll) {
        (Some(_), Some(_)) => {
            return Err(LogError::Invalid(
                "Provide either dice to roll or a roll result, not both".to_string(),
            ))
        }
        (Some(counts), None) => {
            let mut table = DiceTable::from_counts(&counts)?;
            table.roll(rng);
            table.to_payload()
        }
        (None, Some(payload)) => DiceTable::parse_payload(&payload)?.to_payload(),
        (None, None) => String::new(),
    };

    if roll.is_empty() && request.msg.trim().is_empty() {
        return Err(LogError::Invalid(
            "Message must contain text or dice".to_string(),
        ));
    }

    let message = Message {
        user: request.user.trim().to_string(),
        msg: request.msg,
        roll,
        timestamp: now,
        user_id: request.user_id,
    };

    store
        .append_message(code.as_str(), &message)
        .map_err(|e| LogError::from_store(code, e))
}

pub fn read_messages<S>(store: &S, code: &SessionCode) -> Result<Vec<StoredMessage>, LogError>
where
    S: SessionStore + ?Sized,
{
    ensure_live(store, code)?;
    store
        .read_log(code.as_str())
        .map_err(|e| LogError::from_store(code, e))
}

pub fn load_session<S>(store: &S, code: &SessionCode, ttl: Duration) -> Result<SessionView, LogError>
where
    S: SessionStore + ?Sized,
{
    let created_at = ensure_live(store, code)?;
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    // An index entry whose log write never landed still loads, with an empty log.
    let messages = store
        .read_log(code.as_str())
        .map_err(|e| LogError::from_store(code, e))?;

    Ok(SessionView {
        code: code.to_string(),
        created_at,
        expires_at: created_at.map(|t| t.saturating_add(ttl_secs)),
        messages,
    })
}

/// Creation timestamp of a live session; `None` inside when the stored value is unreadable.
pub fn ensure_live<S>(store: &S, code: &SessionCode) -> Result<Option<i64>, LogError>
where
    S: SessionStore + ?Sized,
{
    match store
        .get(&StorePath::SessionTimestamp(code.to_string()))
        .map_err(|e| LogError::from_store(code, e))?
    {
        Some(value) => Ok(value.as_i64()),
        None => Err(LogError::SessionNotFound(code.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::session::dice::DieKind;
    use crate::store::testing::{open_store, seed_session};

    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn code(raw: &str) -> SessionCode {
        SessionCode::parse(raw).expect("valid code")
    }

    fn post(user: &str, msg: &str) -> PostMessage {
        PostMessage {
            user: user.to_string(),
            user_id: "player-1".to_string(),
            msg: msg.to_string(),
            dice: None,
            roll: None,
        }
    }

    #[test]
    fn text_message_is_appended_after_start() {
        let (_dir, store) = open_store("log_text.sled");
        seed_session(&store, "AB12CD", NOW);
        let mut rng = StdRng::seed_from_u64(1);

        let stored =
            post_message(&store, &code("AB12CD"), post(" Aria ", "hello"), NOW + 1, &mut rng)
                .unwrap();

        assert_eq!(stored.message.user, "Aria");
        assert_eq!(stored.message.roll, "");
        let log = read_messages(&store, &code("AB12CD")).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].message, Message::session_start(NOW));
        assert_eq!(log[1], stored);
    }

    #[test]
    fn dice_are_rolled_server_side() {
        let (_dir, store) = open_store("log_dice.sled");
        seed_session(&store, "AB12CD", NOW);
        let mut rng = StdRng::seed_from_u64(9);
        let mut request = post("Aria", "");
        request.dice = Some([("d20".to_string(), Some(2.0))].into_iter().collect());

        let stored = post_message(&store, &code("AB12CD"), request, NOW, &mut rng).unwrap();

        let table = DiceTable::parse_payload(&stored.message.roll).unwrap();
        let d20 = table.get(DieKind::D20).unwrap();
        assert_eq!(d20.count, 2);
        assert!((2..=40).contains(&d20.total));
    }

    #[test]
    fn pre_rolled_payload_is_normalized() {
        let (_dir, store) = open_store("log_payload.sled");
        seed_session(&store, "AB12CD", NOW);
        let mut rng = StdRng::seed_from_u64(3);
        let mut request = post("Aria", "");
        request.roll = Some("1:d20:15, 2:d6:7".to_string());

        let stored = post_message(&store, &code("AB12CD"), request, NOW, &mut rng).unwrap();
        assert_eq!(stored.message.roll, "2:d6:7,1:d20:15");
    }

    #[test]
    fn impossible_pre_rolled_payload_is_rejected() {
        let (_dir, store) = open_store("log_payload_bounds.sled");
        seed_session(&store, "AB12CD", NOW);
        let mut rng = StdRng::seed_from_u64(3);
        let mut request = post("Aria", "");
        request.roll = Some("4000000000:d6:1".to_string());

        let err = post_message(&store, &code("AB12CD"), request, NOW, &mut rng).unwrap_err();
        assert!(matches!(err, LogError::Dice(DiceError::Malformed(_))));
        assert_eq!(read_messages(&store, &code("AB12CD")).unwrap().len(), 1);
    }

    #[test]
    fn empty_post_is_rejected() {
        let (_dir, store) = open_store("log_empty.sled");
        seed_session(&store, "AB12CD", NOW);
        let mut rng = StdRng::seed_from_u64(3);

        let err = post_message(&store, &code("AB12CD"), post("Aria", "  "), NOW, &mut rng)
            .unwrap_err();
        assert!(matches!(err, LogError::Invalid(_)));
    }

    #[test]
    fn posting_to_unknown_session_fails() {
        let (_dir, store) = open_store("log_unknown.sled");
        let mut rng = StdRng::seed_from_u64(3);

        let err = post_message(&store, &code("ZZZZZZ"), post("Aria", "hi"), NOW, &mut rng)
            .unwrap_err();
        assert!(matches!(err, LogError::SessionNotFound(_)));
        assert!(store.read_log("ZZZZZZ").unwrap().is_empty());
    }

    #[test]
    fn view_reports_expiry() {
        let (_dir, store) = open_store("log_view.sled");
        seed_session(&store, "AB12CD", NOW);

        let view = load_session(&store, &code("AB12CD"), Duration::from_secs(60)).unwrap();
        assert_eq!(view.created_at, Some(NOW));
        assert_eq!(view.expires_at, Some(NOW + 60));
        assert_eq!(view.messages.len(), 1);

        assert!(matches!(
            load_session(&store, &code("XY99ZZ"), Duration::from_secs(60)),
            Err(LogError::SessionNotFound(_))
        ));
    }
}

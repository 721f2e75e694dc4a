use std::fmt;

/// Top-level collections, named as they appear in store paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    SessionTimestamps,
    Sessions,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionTimestamps => "sessionTimestamps",
            Self::Sessions => "sessions",
        }
    }
}

/// Addressable locations in the store.
///
/// ```text
/// sessionTimestamps/<code>            -> integer epoch seconds
/// sessions/<code>                     -> the whole log of one session
/// sessions/<code>/<pushId>            -> one message
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StorePath {
    SessionTimestamp(String),
    SessionLog(String),
    SessionMessage(String, String),
}

impl StorePath {
    pub fn code(&self) -> &str {
        match self {
            Self::SessionTimestamp(code) | Self::SessionLog(code) | Self::SessionMessage(code, _) => {
                code
            }
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionTimestamp(code) => {
                write!(f, "{}/{}", Collection::SessionTimestamps.as_str(), code)
            }
            Self::SessionLog(code) => write!(f, "{}/{}", Collection::Sessions.as_str(), code),
            Self::SessionMessage(code, push_id) => {
                write!(f, "{}/{}/{}", Collection::Sessions.as_str(), code, push_id)
            }
        }
    }
}

pub fn session_timestamp_key(code: &str) -> String {
    code.to_string()
}

pub fn session_message_key(code: &str, push_id: &str) -> String {
    format!("{}/{}", code, push_id)
}

pub fn session_log_prefix(code: &str) -> String {
    format!("{}/", code)
}

/// Zero-padded so lexicographic key order matches generation order.
pub fn push_id(id: u64) -> String {
    format!("{:020}", id)
}

/// Split a `sessions` tree key back into `(code, push_id)`.
pub fn split_message_key(key: &[u8]) -> Option<(String, String)> {
    let sep = key.iter().position(|b| *b == b'/')?;
    let code = std::str::from_utf8(&key[..sep]).ok()?;
    let push_id = std::str::from_utf8(&key[sep + 1..]).ok()?;
    if code.is_empty() || push_id.is_empty() {
        return None;
    }
    Some((code.to_string(), push_id.to_string()))
}

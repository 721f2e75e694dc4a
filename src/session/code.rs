use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::{SESSION_CODE_CHARSET, SESSION_CODE_LENGTH};

/// Short, human-typable session identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidSessionCode {
    #[error("session code must be {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("session code contains unsupported character {0:?}")]
    Charset(char),
}

impl SessionCode {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..SESSION_CODE_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..SESSION_CODE_CHARSET.len());
                SESSION_CODE_CHARSET[idx] as char
            })
            .collect();
        Self(code)
    }

    pub fn parse(raw: &str) -> Result<Self, InvalidSessionCode> {
        let actual = raw.chars().count();
        if actual != SESSION_CODE_LENGTH {
            return Err(InvalidSessionCode::Length {
                expected: SESSION_CODE_LENGTH,
                actual,
            });
        }
        if let Some(bad) = raw
            .chars()
            .find(|c| !c.is_ascii() || !SESSION_CODE_CHARSET.contains(&(*c as u8)))
        {
            return Err(InvalidSessionCode::Charset(bad));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = InvalidSessionCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(value: SessionCode) -> Self {
        value.0
    }
}

impl AsRef<str> for SessionCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

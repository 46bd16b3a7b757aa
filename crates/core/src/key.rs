//! Coordination keys

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier scoping one accumulation/lock lifecycle (e.g. a chat id).
///
/// Keys are opaque to the engine; the only rule is that they are non-empty
/// once surrounding whitespace is stripped.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CoordinationKey(String);

/// Rejected coordination key
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("coordination key must not be empty")]
    Empty,
}

impl CoordinationKey {
    /// Create a key, trimming surrounding whitespace
    pub fn new(raw: impl Into<String>) -> Result<Self, KeyError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }
        if trimmed.len() == raw.len() {
            Ok(Self(raw))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw bytes used as the storage key
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for CoordinationKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CoordinationKey> for String {
    fn from(key: CoordinationKey) -> Self {
        key.0
    }
}

impl std::str::FromStr for CoordinationKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl std::fmt::Display for CoordinationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CoordinationKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

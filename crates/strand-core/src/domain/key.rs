//! NamespaceKey - 直列化ドメインのキー
//!
//! 同じキーの episode は 1 件ずつ、受付順に処理されます。
//! キーが違えば完全に並列です。

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::KeyError;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 256;

/// A validated namespace key (the group id of an episode).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NamespaceKey(String);

impl NamespaceKey {
    /// Validate and wrap a key.
    ///
    /// Rules:
    /// - not empty (after trimming whitespace)
    /// - at most [`MAX_KEY_LEN`] bytes
    /// - no control characters
    pub fn parse(value: impl Into<String>) -> Result<Self, KeyError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(KeyError::Empty);
        }
        if value.len() > MAX_KEY_LEN {
            return Err(KeyError::TooLong {
                len: value.len(),
                max: MAX_KEY_LEN,
            });
        }
        if value.chars().any(char::is_control) {
            return Err(KeyError::ControlCharacter);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for NamespaceKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for NamespaceKey {
    type Error = KeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<NamespaceKey> for String {
    fn from(key: NamespaceKey) -> Self {
        key.0
    }
}

impl fmt::Display for NamespaceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

//! Short link identifier.
//!
//! Verification emails link to `/v/{id}` instead of carrying the token in a
//! query string, because some email clients strip query parameters.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`ShortLinkId`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortLinkIdError {
    /// Wrong number of characters.
    #[error("short link id must be exactly {expected} characters")]
    InvalidLength {
        /// Required length.
        expected: usize,
    },
    /// Contains a character outside `[A-Za-z0-9]`.
    #[error("short link id must be alphanumeric")]
    InvalidCharacter,
}

/// An 8-character alphanumeric short link identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShortLinkId(String);

impl ShortLinkId {
    /// Number of characters in an id.
    pub const LEN: usize = 8;

    /// Characters ids are drawn from.
    pub const ALPHABET: &'static [u8] =
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

    /// Parse a `ShortLinkId` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not exactly 8 ASCII alphanumeric characters.
    pub fn parse(s: &str) -> Result<Self, ShortLinkIdError> {
        if s.len() != Self::LEN {
            return Err(ShortLinkIdError::InvalidLength { expected: Self::LEN });
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ShortLinkIdError::InvalidCharacter);
        }
        Ok(Self(s.to_owned()))
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortLinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ShortLinkId {
    type Error = ShortLinkIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ShortLinkId> for String {
    fn from(id: ShortLinkId) -> Self {
        id.0
    }
}

impl std::str::FromStr for ShortLinkId {
    type Err = ShortLinkIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert!(ShortLinkId::parse("aB3dE6gH").is_ok());
    }

    #[test]
    fn test_parse_wrong_length() {
        assert_eq!(
            ShortLinkId::parse("abc"),
            Err(ShortLinkIdError::InvalidLength { expected: 8 })
        );
        assert!(ShortLinkId::parse("abcdefghi").is_err());
    }

    #[test]
    fn test_parse_rejects_symbols() {
        assert_eq!(
            ShortLinkId::parse("abcd-fgh"),
            Err(ShortLinkIdError::InvalidCharacter)
        );
    }

    #[test]
    fn test_alphabet_is_alphanumeric() {
        assert_eq!(ShortLinkId::ALPHABET.len(), 62);
        assert!(ShortLinkId::ALPHABET.iter().all(u8::is_ascii_alphanumeric));
    }
}

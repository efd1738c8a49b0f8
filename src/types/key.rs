//! The `Idempotency-Key` newtype.
//!
//! Keys are opaque to this crate: they are never generated, parsed, or
//! normalized, only checked for presence and minimum length. Minimum length
//! is measured in bytes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default minimum key length (bytes).
pub const DEFAULT_MIN_KEY_LENGTH: usize = 32;

/// Number of leading bytes shown by [`IdempotencyKey::short`].
const SHORT_KEY_LEN: usize = 8;

/// Reasons a raw header value is rejected as an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidKey {
    /// The header is absent or empty.
    #[error("missing header: Idempotency-Key")]
    Missing,

    /// The header is shorter than the configured minimum.
    #[error("Minimum idempotency key length: {min}")]
    TooShort { min: usize },

    /// The header value is not valid UTF-8.
    #[error("malformed header: Idempotency-Key")]
    Malformed,
}

/// A client-supplied idempotency key that passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Validates a raw key against `min_len`.
    pub fn parse(raw: impl Into<String>, min_len: usize) -> Result<Self, InvalidKey> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidKey::Missing);
        }
        if raw.len() < min_len {
            return Err(InvalidKey::TooShort { min: min_len });
        }
        Ok(IdempotencyKey(raw))
    }

    /// Validates raw header bytes. `None` means the header was not sent.
    pub fn from_header_bytes(raw: Option<&[u8]>, min_len: usize) -> Result<Self, InvalidKey> {
        let raw = raw.ok_or(InvalidKey::Missing)?;
        let raw = std::str::from_utf8(raw).map_err(|_| InvalidKey::Malformed)?;
        Self::parse(raw, min_len)
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a short prefix of the key for logging.
    ///
    /// Full keys are bearer-like tokens and stay out of logs.
    pub fn short(&self) -> &str {
        let mut end = SHORT_KEY_LEN.min(self.0.len());
        while !self.0.is_char_boundary(end) {
            end -= 1;
        }
        &self.0[..end]
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for IdempotencyKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{arb_key, arb_short_key};
    use proptest::prelude::*;

    #[test]
    fn empty_key_is_missing() {
        assert_eq!(IdempotencyKey::parse("", 32), Err(InvalidKey::Missing));
    }

    #[test]
    fn absent_header_is_missing() {
        assert_eq!(
            IdempotencyKey::from_header_bytes(None, 32),
            Err(InvalidKey::Missing)
        );
    }

    #[test]
    fn non_utf8_header_is_malformed() {
        let raw = [0xff_u8; 40];
        assert_eq!(
            IdempotencyKey::from_header_bytes(Some(&raw), 32),
            Err(InvalidKey::Malformed)
        );
    }

    #[test]
    fn key_at_exact_minimum_is_accepted() {
        let key = IdempotencyKey::parse("a".repeat(32), 32).unwrap();
        assert_eq!(key.as_str().len(), 32);
    }

    #[test]
    fn too_short_message_names_the_minimum() {
        let err = IdempotencyKey::parse("abc", 32).unwrap_err();
        assert_eq!(err.to_string(), "Minimum idempotency key length: 32");
    }

    #[test]
    fn missing_message_names_the_header() {
        assert_eq!(
            InvalidKey::Missing.to_string(),
            "missing header: Idempotency-Key"
        );
    }

    #[test]
    fn zero_minimum_still_rejects_empty() {
        assert_eq!(IdempotencyKey::parse("", 0), Err(InvalidKey::Missing));
        assert!(IdempotencyKey::parse("x", 0).is_ok());
    }

    #[test]
    fn short_respects_char_boundaries() {
        let key = IdempotencyKey::parse("ééééééééé", 0).unwrap();
        assert_eq!(key.short(), "éééé");
    }

    #[test]
    fn short_handles_short_input() {
        let key = IdempotencyKey::parse("abc", 0).unwrap();
        assert_eq!(key.short(), "abc");
    }

    proptest! {
        #[test]
        fn long_enough_keys_are_accepted_verbatim(raw in arb_key(32)) {
            let key = IdempotencyKey::parse(raw.clone(), 32).unwrap();
            prop_assert_eq!(key.as_str(), raw.as_str());
        }

        #[test]
        fn short_keys_are_rejected(raw in arb_short_key(32)) {
            prop_assert_eq!(
                IdempotencyKey::parse(raw, 32),
                Err(InvalidKey::TooShort { min: 32 })
            );
        }

        #[test]
        fn serde_roundtrip(raw in arb_key(32)) {
            let key = IdempotencyKey::parse(raw, 32).unwrap();
            let json = serde_json::to_string(&key).unwrap();
            let parsed: IdempotencyKey = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(key, parsed);
        }
    }
}

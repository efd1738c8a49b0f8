//! Shared test utilities and arbitrary generators for property-based testing.

use proptest::prelude::*;

use crate::types::{DEFAULT_MIN_KEY_LENGTH, IdempotencyKey};

/// A valid key made of one repeated character, e.g. `"aaaa…"`.
pub fn test_key(ch: char) -> IdempotencyKey {
    IdempotencyKey::parse(ch.to_string().repeat(DEFAULT_MIN_KEY_LENGTH), DEFAULT_MIN_KEY_LENGTH)
        .unwrap()
}

/// ASCII keys at least `min` bytes long.
pub fn arb_key(min: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(KEY_ALPHABET), min.max(1)..min.max(1) + 48)
        .prop_map(|chars| chars.into_iter().collect())
}

/// Non-empty ASCII keys shorter than `min` bytes. `min` must be at least 2.
pub fn arb_short_key(min: usize) -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(KEY_ALPHABET), 1..min)
        .prop_map(|chars| chars.into_iter().collect())
}

const KEY_ALPHABET: &[char] = &[
    'a', 'b', 'c', 'd', 'e', 'f', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', '-', '_',
    'A', 'Z',
];

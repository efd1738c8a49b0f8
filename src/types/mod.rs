//! Core domain types for the idempotency gate.

pub mod key;

pub use key::{DEFAULT_MIN_KEY_LENGTH, IdempotencyKey, InvalidKey};

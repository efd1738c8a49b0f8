//! Idempotency Gate - `Idempotency-Key` coordination middleware for axum.
//!
//! The first request carrying a key runs the handler; every other request
//! with the same key, concurrent or later within the entry TTL, receives a
//! verbatim replay of that response.

pub mod config;
pub mod coordinator;
pub mod server;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use config::IdempotencyConfig;
pub use coordinator::{Coordinator, IdempotencyError};
pub use server::{IDEMPOTENCY_KEY_HEADER, idempotency_middleware};

//! Coordination errors and their HTTP mapping.
//!
//! Every variant is terminal for the current request. None of them is ever
//! stored under the key; only a completed executor response is replayed.

use std::time::Duration;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::types::InvalidKey;

/// Errors surfaced to a caller of an idempotent route.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdempotencyError {
    /// The `Idempotency-Key` header is absent, too short, or not UTF-8.
    #[error(transparent)]
    InvalidKey(#[from] InvalidKey),

    /// The admitted operation's entry vanished before it became ready.
    ///
    /// Either the entry expired while its executor was still running, or the
    /// executor exited without publishing a response.
    #[error("idempotent operation state was lost")]
    LostEntry,

    /// The executor did not publish a response within the follower's wait bound.
    #[error("timed out after {}ms waiting for the request holding this idempotency key", .waited.as_millis())]
    WaitTimeout { waited: Duration },

    /// The downstream handler panicked before producing a response.
    #[error("downstream handler failed")]
    HandlerPanicked,

    /// The handler task was cancelled, normally because the runtime is
    /// shutting down.
    #[error("downstream handler was cancelled")]
    HandlerCancelled,
}

impl IdempotencyError {
    /// Returns the HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            IdempotencyError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            IdempotencyError::LostEntry => StatusCode::INTERNAL_SERVER_ERROR,
            IdempotencyError::WaitTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            IdempotencyError::HandlerPanicked => StatusCode::INTERNAL_SERVER_ERROR,
            IdempotencyError::HandlerCancelled => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for IdempotencyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

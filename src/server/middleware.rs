//! The `Idempotency-Key` middleware.
//!
//! Attach with [`axum::middleware::from_fn_with_state`], passing the
//! [`Coordinator`] that owns the key space for the wrapped routes:
//!
//! ```ignore
//! Router::new()
//!     .route("/orders", post(create_order))
//!     .route_layer(from_fn_with_state(coordinator, idempotency_middleware));
//! ```

use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tokio::task::JoinError;
use tracing::{Instrument, Span, debug, error, warn};

use crate::coordinator::{Admission, CaptureBody, Coordinator, Executor, IdempotencyError};

/// Request header carrying the client's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Runs the wrapped handler once per key and replays its response to every
/// other request carrying the same key.
pub async fn idempotency_middleware(
    State(coordinator): State<Coordinator>,
    request: Request,
    next: Next,
) -> Result<Response, IdempotencyError> {
    let key = coordinator
        .parse_key(request.headers().get(IDEMPOTENCY_KEY_HEADER))
        .inspect_err(|e| debug!(error = %e, "Rejecting request"))?;

    match coordinator.admit(key) {
        Admission::Executor(executor) => execute(executor, request, next).await,
        Admission::Follower(follower) => Ok(follower.wait().await?.replay()),
    }
}

/// Runs the handler on its own task so a disconnecting caller cannot cancel
/// the side effect halfway. The task stays inside the request's span.
async fn execute(
    executor: Executor,
    request: Request,
    next: Next,
) -> Result<Response, IdempotencyError> {
    let key = executor.key().short().to_string();
    let admission = executor.admission();

    let handler = tokio::spawn(
        async move {
            let response = next.run(request).await;
            let (parts, body) = response.into_parts();
            let body = CaptureBody::new(&parts, body, executor);
            Response::from_parts(parts, Body::new(body))
        }
        .instrument(Span::current()),
    );

    handler.await.map_err(|e| {
        let err = handler_failure(&e);
        match err {
            IdempotencyError::HandlerCancelled => {
                warn!(key = %key, admission, "Handler task cancelled, key released");
            }
            _ => error!(key = %key, admission, error = %e, "Handler task failed, key released"),
        }
        err
    })
}

/// Maps a failed handler task to the error its caller sees.
fn handler_failure(err: &JoinError) -> IdempotencyError {
    if err.is_cancelled() {
        IdempotencyError::HandlerCancelled
    } else {
        IdempotencyError::HandlerPanicked
    }
}

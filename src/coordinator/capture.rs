//! Response capture for the executor path.
//!
//! [`CaptureBody`] wraps the handler's response body. Every frame passes
//! through to the real caller unchanged and unbuffered, while a copy of the
//! data is accumulated on the side. Once the body ends, the accumulated copy
//! is published through the [`Executor`] guard.
//!
//! # Incomplete Bodies
//!
//! - The caller disconnects mid-body: the remainder is drained on a spawned
//!   task so followers still receive the complete response.
//! - The inner body fails: the copy is incomplete and cannot be replayed
//!   faithfully, so the executor guard is dropped and the key released.
//! - Trailers are forwarded but not captured.

use std::mem;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::{Body, Bytes};
use axum::http::response::Parts;
use axum::http::{HeaderMap, StatusCode};
use bytes::BytesMut;
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::BodyExt;
use tracing::{debug, warn};

use super::{CapturedResponse, Executor};

/// The side copy of a response, plus the right to publish it.
///
/// Dropping a recording that still holds its executor releases the key.
struct Recording {
    status: StatusCode,
    headers: HeaderMap,
    buffer: BytesMut,
    executor: Option<Executor>,
}

impl Recording {
    fn publish(&mut self) {
        if let Some(executor) = self.executor.take() {
            let body = mem::take(&mut self.buffer).freeze();
            let headers = mem::take(&mut self.headers);
            executor.complete(CapturedResponse::new(self.status, headers, body));
        }
    }

    fn abandon(&mut self) {
        self.executor.take();
    }

    fn is_open(&self) -> bool {
        self.executor.is_some()
    }
}

/// A body decorator that forwards frames live and records a copy.
pub struct CaptureBody {
    inner: Body,
    recording: Recording,
}

impl CaptureBody {
    /// Wraps `inner`, recording the status and headers from `parts`.
    pub fn new(parts: &Parts, inner: Body, executor: Executor) -> Self {
        CaptureBody {
            inner,
            recording: Recording {
                status: parts.status,
                headers: parts.headers.clone(),
                buffer: BytesMut::new(),
                executor: Some(executor),
            },
        }
    }
}

impl HttpBody for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.recording.buffer.extend_from_slice(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                warn!(error = %err, "Response body failed, response will not be replayed");
                this.recording.abandon();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.recording.publish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CaptureBody {
    fn drop(&mut self) {
        if !self.recording.is_open() {
            return;
        }
        // Servers may stop polling once the body reports its end.
        if self.inner.is_end_stream() {
            self.recording.publish();
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Response dropped mid-body outside a runtime, releasing key");
            self.recording.abandon();
            return;
        };
        let rest = mem::replace(&mut self.inner, Body::empty());
        let recording = Recording {
            status: self.recording.status,
            headers: mem::take(&mut self.recording.headers),
            buffer: mem::take(&mut self.recording.buffer),
            executor: self.recording.executor.take(),
        };
        debug!("Caller went away mid-body, draining the rest for followers");
        runtime.spawn(drain(rest, recording));
    }
}

/// Collects the remainder of `rest` into `recording` and publishes it.
async fn drain(rest: Body, mut recording: Recording) {
    match rest.collect().await {
        Ok(collected) => {
            recording.buffer.extend_from_slice(&collected.to_bytes());
            recording.publish();
        }
        Err(err) => {
            warn!(error = %err, "Response body failed while draining, releasing key");
            recording.abandon();
        }
    }
}

//! Admission, wait and replay protocol for idempotency keys.
//!
//! For every request carrying a key, the coordinator decides whether the
//! request is the **executor** (first to admit the key, runs the handler) or a
//! **follower** (waits for the executor's response and replays it).
//!
//! # Protocol
//!
//! 1. The key is validated (presence, minimum length).
//! 2. A pending [`Entry`] is inserted with [`EntryStore::insert_if_absent`].
//!    Exactly one concurrent caller per key wins.
//! 3. The winner receives an [`Executor`] guard. It runs the handler, and the
//!    [`CaptureBody`] decorator publishes the captured response when the body
//!    completes.
//! 4. Everyone else receives a [`Follower`]. It suspends on the entry's
//!    publication signal, re-reads the store when woken, and replays the
//!    ready response.
//!
//! # Failure Handling
//!
//! The executor guard releases its pending entry on every exit path that
//! does not publish (panic, body error, dropped response). Followers then
//! fail fast with [`IdempotencyError::LostEntry`] instead of waiting out the
//! TTL, and the key is free for a fresh admission. Follower waits are
//! bounded by [`IdempotencyConfig::wait_timeout`].
//!
//! # Expiry Sweep
//!
//! A coordinator built inside a tokio runtime starts a janitor that sweeps
//! its store every [`IdempotencyConfig::cleanup_interval`]. The janitor stops
//! when the last clone of the coordinator is dropped or on
//! [`Coordinator::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::http::HeaderValue;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::IdempotencyConfig;
use crate::store::{EntryStore, spawn_janitor};
use crate::types::IdempotencyKey;

mod capture;
mod error;
mod executor;
mod follower;
mod response;

pub use capture::CaptureBody;
pub use error::IdempotencyError;
pub use executor::Executor;
pub use follower::Follower;
pub use response::CapturedResponse;

/// Identifies one admission of a key.
///
/// A key that expires and is admitted again gets a new id, so a slow
/// executor from the earlier admission cannot touch the newer entry.
pub type AdmissionId = u64;

/// State of an admitted operation.
#[derive(Debug, Clone)]
pub enum EntryState {
    /// The executor is still running.
    Pending,
    /// The executor published its response.
    Ready(Arc<CapturedResponse>),
}

/// The value stored per key.
#[derive(Debug, Clone)]
pub struct Entry {
    admission: AdmissionId,
    state: EntryState,
    /// Flips to `true` after the ready entry is in the store. Closed without
    /// flipping if the executor goes away.
    published: watch::Receiver<bool>,
}

impl Entry {
    /// Returns the admission that created this entry.
    pub fn admission(&self) -> AdmissionId {
        self.admission
    }

    /// Returns whether the executor is still running or has published.
    pub fn state(&self) -> &EntryState {
        &self.state
    }

    /// Returns `true` once the executor has published its response.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, EntryState::Ready(_))
    }

    /// Returns the captured response once the entry is ready.
    pub fn response(&self) -> Option<&Arc<CapturedResponse>> {
        match &self.state {
            EntryState::Ready(response) => Some(response),
            EntryState::Pending => None,
        }
    }
}

/// Outcome of admitting a key.
#[derive(Debug)]
pub enum Admission {
    /// This request runs the handler.
    Executor(Executor),
    /// Another request holds the key; wait for and replay its response.
    Follower(Follower),
}

/// Shared handle to an idempotency store plus its configuration.
///
/// Cheap to clone. Each coordinator owns its store, so separate routes can
/// use separate coordinators without sharing keys.
#[derive(Debug, Clone)]
pub struct Coordinator {
    inner: Arc<CoordinatorInner>,
}

#[derive(Debug)]
struct CoordinatorInner {
    store: Arc<EntryStore<Entry>>,
    config: IdempotencyConfig,
    next_admission: AtomicU64,
    /// Stops the janitor.
    shutdown: CancellationToken,
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl Coordinator {
    /// Creates a coordinator with a fresh store whose TTL is `config.expiration`.
    pub fn new(config: IdempotencyConfig) -> Self {
        let store = Arc::new(EntryStore::new(config.expiration));
        Self::with_store(store, config)
    }

    /// Creates a coordinator over an existing store.
    ///
    /// The store's own TTL governs expiry; `config.expiration` is ignored.
    /// Outside a tokio runtime no janitor is started, and expired entries
    /// stay in memory (though invisible) until they are overwritten.
    pub fn with_store(store: Arc<EntryStore<Entry>>, config: IdempotencyConfig) -> Self {
        let shutdown = CancellationToken::new();
        if tokio::runtime::Handle::try_current().is_ok() {
            spawn_janitor(&store, config.cleanup_interval, shutdown.clone());
        } else {
            warn!("Coordinator built outside a tokio runtime, expired entries will not be swept");
        }
        Coordinator {
            inner: Arc::new(CoordinatorInner {
                store,
                config,
                next_admission: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    /// Returns the configuration this coordinator was built with.
    pub fn config(&self) -> &IdempotencyConfig {
        &self.inner.config
    }

    /// Returns the store holding this coordinator's entries.
    pub fn store(&self) -> &Arc<EntryStore<Entry>> {
        &self.inner.store
    }

    /// Validates the raw `Idempotency-Key` header.
    pub fn parse_key(&self, header: Option<&HeaderValue>) -> Result<IdempotencyKey, IdempotencyError> {
        let key = IdempotencyKey::from_header_bytes(
            header.map(HeaderValue::as_bytes),
            self.inner.config.min_key_length,
        )?;
        Ok(key)
    }

    /// Admits `key`, deciding whether the caller executes or follows.
    pub fn admit(&self, key: IdempotencyKey) -> Admission {
        let admission = self.inner.next_admission.fetch_add(1, Ordering::Relaxed);
        let (published_tx, published_rx) = watch::channel(false);
        let entry = Entry {
            admission,
            state: EntryState::Pending,
            published: published_rx,
        };

        if self.inner.store.insert_if_absent(key.as_str(), entry) {
            debug!(key = %key.short(), admission, "Admitted as executor");
            Admission::Executor(Executor::new(
                Arc::clone(&self.inner.store),
                key,
                admission,
                published_tx,
            ))
        } else {
            debug!(key = %key.short(), "Key in use, following");
            Admission::Follower(Follower::new(
                Arc::clone(&self.inner.store),
                key,
                self.inner.config.recheck_interval,
                self.inner.config.wait_timeout,
            ))
        }
    }

    /// Stops the background sweep. Admission and replay keep working.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Returns `true` once the background sweep has been told to stop.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }
}

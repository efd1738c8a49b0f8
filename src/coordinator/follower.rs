//! Waiting for another request's result.
//!
//! A follower suspends on the publication signal of the entry it found, with
//! a periodic recheck of the store as a fallback. The recheck catches entries
//! that expire while their executor is still running. Every wake-up re-reads
//! the store, so the store stays the single source of truth.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{AdmissionId, CapturedResponse, Entry, IdempotencyError};
use crate::store::EntryStore;
use crate::types::IdempotencyKey;

/// A request that lost admission and replays the executor's response.
#[derive(Debug)]
pub struct Follower {
    store: Arc<EntryStore<Entry>>,
    key: IdempotencyKey,
    recheck_interval: Duration,
    wait_timeout: Duration,
}

impl Follower {
    pub(super) fn new(
        store: Arc<EntryStore<Entry>>,
        key: IdempotencyKey,
        recheck_interval: Duration,
        wait_timeout: Duration,
    ) -> Self {
        Follower {
            store,
            key,
            recheck_interval,
            wait_timeout,
        }
    }

    /// Returns the key whose response this follower waits for.
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Waits until the entry is ready, then returns its captured response.
    ///
    /// # Errors
    ///
    /// - [`IdempotencyError::LostEntry`] if the entry disappears, is
    ///   re-admitted, or its executor exits without publishing.
    /// - [`IdempotencyError::WaitTimeout`] if nothing is published within
    ///   the configured wait timeout.
    pub async fn wait(self) -> Result<Arc<CapturedResponse>, IdempotencyError> {
        match tokio::time::timeout(self.wait_timeout, self.wait_ready()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    key = %self.key.short(),
                    waited_ms = self.wait_timeout.as_millis() as u64,
                    "Timed out waiting for executor"
                );
                Err(IdempotencyError::WaitTimeout {
                    waited: self.wait_timeout,
                })
            }
        }
    }

    async fn wait_ready(&self) -> Result<Arc<CapturedResponse>, IdempotencyError> {
        let mut entry = self.current(None)?;
        let admission = entry.admission;
        let mut published = entry.published.clone();

        loop {
            if let Some(response) = entry.response() {
                debug!(key = %self.key.short(), admission, "Replaying captured response");
                return Ok(Arc::clone(response));
            }

            tokio::select! {
                changed = published.changed() => {
                    if changed.is_err() {
                        // Executor gone; whatever the store holds now is final.
                        return self
                            .current(Some(admission))?
                            .response()
                            .cloned()
                            .ok_or_else(|| self.lost(Some(admission)));
                    }
                }
                _ = tokio::time::sleep(self.recheck_interval) => {}
            }

            entry = self.current(Some(admission))?;
        }
    }

    /// Reads the live entry, requiring it to belong to `admission` if given.
    fn current(&self, admission: Option<AdmissionId>) -> Result<Entry, IdempotencyError> {
        match self.store.get(self.key.as_str()) {
            Some(entry) if admission.is_none_or(|id| id == entry.admission) => Ok(entry),
            Some(entry) => {
                debug!(
                    key = %self.key.short(),
                    expected = admission,
                    found = entry.admission,
                    "Key was re-admitted while waiting"
                );
                Err(IdempotencyError::LostEntry)
            }
            None => Err(self.lost(admission)),
        }
    }

    /// `admission` is `None` when the entry was already gone on first read.
    fn lost(&self, admission: Option<AdmissionId>) -> IdempotencyError {
        match admission {
            Some(admission) => {
                warn!(key = %self.key.short(), admission, "Entry lost before it became ready")
            }
            None => warn!(key = %self.key.short(), "Entry gone before it could be read"),
        }
        IdempotencyError::LostEntry
    }
}

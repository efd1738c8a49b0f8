//! The executor's admission guard.
//!
//! An [`Executor`] is handed to exactly one request per admitted key. It
//! either publishes the captured response ([`Executor::complete`]) or, when
//! dropped without publishing, releases the key so followers stop waiting.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use super::{AdmissionId, CapturedResponse, Entry, EntryState};
use crate::store::{EntryStore, StoreError};
use crate::types::IdempotencyKey;

/// Exclusive right to run the handler for one admission of a key.
#[derive(Debug)]
pub struct Executor {
    store: Arc<EntryStore<Entry>>,
    key: IdempotencyKey,
    admission: AdmissionId,
    published: watch::Sender<bool>,
    finished: bool,
}

impl Executor {
    pub(super) fn new(
        store: Arc<EntryStore<Entry>>,
        key: IdempotencyKey,
        admission: AdmissionId,
        published: watch::Sender<bool>,
    ) -> Self {
        Executor {
            store,
            key,
            admission,
            published,
            finished: false,
        }
    }

    /// Returns the key this executor holds.
    pub fn key(&self) -> &IdempotencyKey {
        &self.key
    }

    /// Returns the admission this executor may publish under.
    pub fn admission(&self) -> AdmissionId {
        self.admission
    }

    /// Publishes the ready response and wakes every follower.
    ///
    /// The store write happens before the signal, so a woken follower always
    /// finds the ready entry unless it has since expired.
    pub fn complete(mut self, response: CapturedResponse) -> Arc<CapturedResponse> {
        self.finished = true;
        let response = Arc::new(response);
        let admission = self.admission;
        let entry = Entry {
            admission,
            state: EntryState::Ready(Arc::clone(&response)),
            published: self.published.subscribe(),
        };

        match self
            .store
            .replace_if(self.key.as_str(), entry, |current| current.admission == admission)
        {
            Ok(()) => {
                debug!(
                    key = %self.key.short(),
                    admission,
                    status = response.status.as_u16(),
                    body_len = response.body.len(),
                    "Published response"
                );
            }
            Err(StoreError::NotFound(_)) => {
                warn!(
                    key = %self.key.short(),
                    admission,
                    "Entry expired before the response was published"
                );
            }
            Err(StoreError::Superseded(_)) => {
                warn!(
                    key = %self.key.short(),
                    admission,
                    "Entry was re-admitted before the response was published"
                );
            }
        }

        self.published.send_replace(true);
        response
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let admission = self.admission;
        let released = self.store.remove_if(self.key.as_str(), |current| {
            current.admission == admission && !current.is_ready()
        });
        warn!(
            key = %self.key.short(),
            admission,
            released,
            "Executor exited without publishing a response, releasing key"
        );
        // Dropping `published` closes the signal; waiting followers re-read
        // the store and report the entry as lost.
    }
}

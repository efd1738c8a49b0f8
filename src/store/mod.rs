//! TTL-expiring entry store.
//!
//! Maps string keys to values that expire a fixed duration after their last
//! write. The store is the only shared mutable state of the idempotency
//! gate, and every access goes through the operations below.
//!
//! # Atomicity
//!
//! [`EntryStore::insert_if_absent`] is the single concurrency primitive the
//! coordinator relies on: of any number of concurrent callers for one key,
//! exactly one observes `true`. The map is sharded, so callers using
//! unrelated keys do not contend on a single lock.
//!
//! # Expiry
//!
//! An entry is expired once `now >= deadline`. Expired entries are invisible
//! to every operation immediately; [`EntryStore::sweep`] (driven by the
//! janitor) reclaims their memory later.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use thiserror::Error;
use tokio::time::Instant;

pub mod janitor;

pub use janitor::spawn_janitor;

/// Errors returned by store writes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No live entry exists under the key.
    #[error("no live entry for key: {0}")]
    NotFound(String),

    /// The live entry did not satisfy the caller's precondition.
    #[error("entry for key was superseded: {0}")]
    Superseded(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug)]
struct Slot<V> {
    value: V,
    expires_at: Instant,
}

impl<V> Slot<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A concurrent map whose entries expire `ttl` after their last write.
#[derive(Debug)]
pub struct EntryStore<V> {
    entries: DashMap<String, Slot<V>>,
    ttl: Duration,
}

impl<V: Clone> EntryStore<V> {
    /// Creates an empty store whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        EntryStore {
            entries: DashMap::new(),
            ttl,
        }
    }

    /// Returns the entry lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn slot(&self, value: V, now: Instant) -> Slot<V> {
        Slot {
            value,
            expires_at: now + self.ttl,
        }
    }

    /// Stores `value` unless a live entry already exists.
    ///
    /// Returns `true` if this call inserted. An expired entry counts as
    /// absent and is overwritten.
    pub fn insert_if_absent(&self, key: &str, value: V) -> bool {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(self.slot(value, now));
                    true
                } else {
                    false
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(self.slot(value, now));
                true
            }
        }
    }

    /// Returns a snapshot of the live entry under `key`.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let slot = self.entries.get(key)?;
        if slot.is_expired(now) {
            None
        } else {
            Some(slot.value.clone())
        }
    }

    /// Overwrites the live entry under `key` and refreshes its deadline.
    pub fn replace(&self, key: &str, value: V) -> Result<()> {
        self.replace_if(key, value, |_| true)
    }

    /// Like [`replace`](Self::replace), but only if `predicate` accepts the
    /// current value.
    pub fn replace_if(&self, key: &str, value: V, predicate: impl FnOnce(&V) -> bool) -> Result<()> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut slot) if !slot.is_expired(now) => {
                if !predicate(&slot.value) {
                    return Err(StoreError::Superseded(key.to_string()));
                }
                *slot = self.slot(value, now);
                Ok(())
            }
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    /// Removes the entry under `key` if `predicate` accepts it.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_if(&self, key: &str, predicate: impl FnOnce(&V) -> bool) -> bool {
        self.entries
            .remove_if(key, |_, slot| predicate(&slot.value))
            .is_some()
    }

    /// Removes all expired entries.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, slot| {
            let keep = !slot.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Returns the number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn insert_if_absent_admits_only_first() {
        let store = EntryStore::new(TTL);
        assert!(store.insert_if_absent("k", 1));
        assert!(!store.insert_if_absent("k", 2));
        assert_eq!(store.get("k"), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn get_missing_returns_none() {
        let store: EntryStore<u32> = EntryStore::new(TTL);
        assert_eq!(store.get("nope"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("k", 1);

        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(store.get("k"), Some(1));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(store.get("k"), None);
        // Not swept yet, but invisible.
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_can_be_readmitted() {
        let store = EntryStore::new(TTL);
        assert!(store.insert_if_absent("k", 1));
        tokio::time::advance(TTL).await;
        assert!(store.insert_if_absent("k", 2));
        assert_eq!(store.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_refreshes_deadline() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("k", 1);

        tokio::time::advance(Duration::from_secs(20)).await;
        store.replace("k", 2).unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(store.get("k"), Some(2));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(store.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn replace_missing_key_is_not_found() {
        let store = EntryStore::new(TTL);
        assert_eq!(
            store.replace("k", 1),
            Err(StoreError::NotFound("k".to_string()))
        );
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn replace_expired_key_is_not_found() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("k", 1);
        tokio::time::advance(TTL).await;
        assert!(matches!(store.replace("k", 2), Err(StoreError::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn replace_if_rejects_when_predicate_fails() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("k", 1);
        assert_eq!(
            store.replace_if("k", 3, |current| *current == 2),
            Err(StoreError::Superseded("k".to_string()))
        );
        assert_eq!(store.get("k"), Some(1));

        store.replace_if("k", 3, |current| *current == 1).unwrap();
        assert_eq!(store.get("k"), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_if_checks_predicate() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("k", 1);
        assert!(!store.remove_if("k", |v| *v == 2));
        assert!(store.remove_if("k", |v| *v == 1));
        assert_eq!(store.get("k"), None);
        assert!(!store.remove_if("k", |_| true));
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired() {
        let store = EntryStore::new(TTL);
        store.insert_if_absent("old", 1);
        tokio::time::advance(Duration::from_secs(20)).await;
        store.insert_if_absent("new", 2);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(store.sweep(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("new"), Some(2));
        assert_eq!(store.sweep(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_insert_if_absent_admits_exactly_one() {
        let store = Arc::new(EntryStore::new(TTL));
        let winners = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let store = Arc::clone(&store);
                let winners = Arc::clone(&winners);
                tokio::spawn(async move {
                    if store.insert_if_absent("shared", i) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(store.len(), 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn one_winner_per_distinct_key(keys in prop::collection::vec("[a-d]{1,2}", 1..40)) {
                let store = EntryStore::new(TTL);
                let mut admitted = std::collections::HashSet::new();
                for (i, key) in keys.iter().enumerate() {
                    let inserted = store.insert_if_absent(key, i);
                    prop_assert_eq!(inserted, admitted.insert(key.clone()));
                }
                prop_assert_eq!(store.len(), admitted.len());
            }
        }
    }
}

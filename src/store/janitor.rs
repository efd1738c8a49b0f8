//! Background sweep of expired entries.
//!
//! The janitor holds only a weak reference to the store, so it exits on its
//! own once every owner has dropped the store. It also exits when the
//! shutdown token is cancelled.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::EntryStore;

/// Smallest sweep interval; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns a task that sweeps `store` every `interval`.
pub fn spawn_janitor<V>(
    store: &Arc<EntryStore<V>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()>
where
    V: Clone + Send + Sync + 'static,
{
    let store = Arc::downgrade(store);
    tokio::spawn(run_janitor(store, interval.max(MIN_SWEEP_INTERVAL), shutdown))
}

async fn run_janitor<V>(store: Weak<EntryStore<V>>, interval: Duration, shutdown: CancellationToken)
where
    V: Clone + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    debug!(interval_ms = interval.as_millis() as u64, "Janitor started");
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("Janitor shutdown requested");
                break;
            }
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else {
                    debug!("Store dropped, stopping janitor");
                    break;
                };
                let removed = store.sweep();
                if removed > 0 {
                    debug!(removed, remaining = store.len(), "Swept expired entries");
                } else {
                    trace!("Sweep found nothing to remove");
                }
            }
        }
    }
}

//! Configuration for idempotency coordination.
//!
//! # Defaults
//!
//! - **Expiration**: 30 seconds after the last write to an entry
//! - **Cleanup interval**: expired entries are swept once a minute
//! - **Minimum key length**: 32 bytes
//! - **Recheck interval**: 45 milliseconds between fallback store reads while a
//!   follower waits (followers are normally woken by the executor directly)
//! - **Wait timeout**: 30 seconds before a follower gives up on the executor

use std::time::Duration;

pub use crate::types::DEFAULT_MIN_KEY_LENGTH;

/// Default entry lifetime (30 seconds).
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(30);

/// Default sweep interval for expired entries (1 minute).
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Default fallback recheck interval for waiting followers (45 milliseconds).
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_millis(45);

/// Default upper bound on a follower's wait (30 seconds).
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration applied when a [`Coordinator`](crate::coordinator::Coordinator) is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// How long an entry lives after its last write.
    pub expiration: Duration,

    /// How often the janitor sweeps expired entries.
    pub cleanup_interval: Duration,

    /// Minimum accepted key length in bytes.
    pub min_key_length: usize,

    /// Interval between fallback store reads while a follower waits.
    ///
    /// Catches entries that expire out from under a waiting follower.
    pub recheck_interval: Duration,

    /// Upper bound on how long a follower waits for the executor.
    pub wait_timeout: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl IdempotencyConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        IdempotencyConfig {
            expiration: DEFAULT_EXPIRATION,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
            min_key_length: DEFAULT_MIN_KEY_LENGTH,
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Creates a configuration from the three classic knobs, keeping defaults
    /// for the follower wait.
    pub fn with_limits(expiration: Duration, cleanup_interval: Duration, min_key_length: usize) -> Self {
        IdempotencyConfig {
            expiration,
            cleanup_interval,
            min_key_length,
            ..Self::new()
        }
    }
}

//! Shared counter store interface
//!
//! The rate limiter keeps its window counters in an external key/value store
//! with per-key expiry (Redis in production). This module specifies the
//! interface the limiter consumes and ships a process-local implementation
//! for tests and single-replica deployments.
//!
//! Multi-process quota correctness rests entirely on the store's atomic
//! increment-with-TTL primitive; the limiter itself takes no locks.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;

use crate::clock::{Clock, SystemClock};

/// Errors surfaced by a counter store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or answered with a failure
    #[error("counter store unavailable: {message}")]
    Unavailable {
        /// Backend-specific detail
        message: String,
    },

    /// A counter key held a value that does not parse as an integer
    #[error("malformed counter value for key '{key}'")]
    MalformedValue {
        /// The offending key
        key: String,
    },
}

/// Result type for counter store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Key/value store with per-key expiry, shared across service replicas
///
/// Keys are plain strings; values are stored as strings to match the wire
/// semantics of the production backend. `increment` must be atomic: two
/// replicas incrementing the same key concurrently may never lose an update.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the value at `key`, or `None` if absent or expired
    async fn read(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write `value` at `key` with the given time-to-live
    async fn write(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically add `by` to the integer at `key`, returning the new value
    ///
    /// A missing or expired key counts from zero and receives `ttl`; the TTL
    /// of a live key is not extended, so a window counter always dies with
    /// its window.
    async fn increment(&self, key: &str, by: u64, ttl: Duration) -> StoreResult<u64>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Process-local counter store with TTL expiry
///
/// Backed by a concurrent hash map; per-key atomicity comes from the map's
/// shard locking. Expired entries are dropped lazily on access, mirroring
/// the TTL behavior of the production backend. Suitable for tests and
/// single-replica deployments only: counters are not visible across
/// processes.
pub struct InMemoryCounterStore<C: Clock = SystemClock> {
    entries: DashMap<String, Entry>,
    clock: C,
}

impl InMemoryCounterStore<SystemClock> {
    /// Create a store using the system clock
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for InMemoryCounterStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryCounterStore<C> {
    /// Create a store with a custom clock (useful for testing TTL expiry)
    pub fn with_clock(clock: C) -> Self {
        Self { entries: DashMap::new(), clock }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        // The read guard must be released before removing an expired entry,
        // or the shard lock deadlocks against itself.
        let (value, expired) = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => (Some(entry.value.clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };
        if expired {
            self.entries.remove(key);
        }
        value
    }
}

#[async_trait]
impl<C: Clock> CounterStore for InMemoryCounterStore<C> {
    async fn read(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn write(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let entry = Entry { value: value.to_string(), expires_at: self.clock.now() + ttl };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn increment(&self, key: &str, by: u64, ttl: Duration) -> StoreResult<u64> {
        let now = self.clock.now();
        // The entry guard holds the shard lock, making read-modify-write
        // atomic per key.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry { value: "0".to_string(), expires_at: now + ttl });

        if entry.expires_at <= now {
            entry.value = "0".to_string();
            entry.expires_at = now + ttl;
        }

        let current: u64 = entry
            .value
            .parse()
            .map_err(|_| StoreError::MalformedValue { key: key.to_string() })?;
        let next = current.saturating_add(by);
        entry.value = next.to_string();
        Ok(next)
    }
}

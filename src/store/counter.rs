//! Windowed counter store.
//!
//! Counters are keyed by (scope, window granularity, window start) and
//! carry a TTL equal to the window length, so a counter lives exactly as
//! long as the bucket it describes. Counts only ever go up; a new window
//! start is a new key, which rules out cross-window leakage by
//! construction.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::StoreError;

/// Window granularity for a counter bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    Hour,
    Day,
}

impl Window {
    /// Window length in milliseconds.
    pub const fn len_ms(self) -> i64 {
        match self {
            Window::Hour => 60 * 60 * 1000,
            Window::Day => 24 * 60 * 60 * 1000,
        }
    }

    /// Counter lifetime: one full window.
    pub const fn ttl(self) -> Duration {
        Duration::from_millis(self.len_ms() as u64)
    }

    /// Floor a timestamp to the start of its window.
    pub const fn floor(self, at_ms: i64) -> i64 {
        at_ms.div_euclid(self.len_ms()) * self.len_ms()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Window::Hour => "hour",
            Window::Day => "day",
        }
    }
}

/// Composite key for one counter bucket.
///
/// `scope` names the counted thing (`click:user:u1`, `click:ip:...`);
/// the window start is derived from the event timestamp, so two events
/// in the same hour always address the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    scope: String,
    window: Window,
    start_ms: i64,
}

impl CounterKey {
    /// Build a key for the window containing `at_ms`.
    pub fn new(scope: impl Into<String>, window: Window, at_ms: i64) -> Self {
        Self {
            scope: scope.into(),
            window,
            start_ms: window.floor(at_ms),
        }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    pub fn start_ms(&self) -> i64 {
        self.start_ms
    }

    /// Render the key as a flat namespaced string.
    pub fn render(&self) -> String {
        format!("{}:{}:{}", self.scope, self.window.as_str(), self.start_ms)
    }
}

/// Atomic, TTL-bounded counters plus a small marker slot for
/// last-seen timestamps.
///
/// Implementations must guarantee that concurrent `increment` calls on
/// the same key never lose an update. They are not required to survive
/// backend outages: callers treat any `Err` as "can't tell" and degrade.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment a bucket, creating it with the window TTL if
    /// absent, and return the new count.
    async fn increment(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Read a bucket. Missing or expired buckets read as 0.
    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError>;

    /// Atomically store a marker value under `scope`, returning the
    /// previous value if it had not expired.
    async fn swap_marker(
        &self,
        scope: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StoreError>;
}

#[derive(Debug)]
struct Cell {
    count: u64,
    expires_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    value: i64,
    expires_at: Instant,
}

/// In-memory counter store backed by sharded maps.
///
/// Expiry is lazy: an expired cell is reset on next access, and
/// `purge_expired` drops idle buckets from a maintenance task.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    counters: DashMap<String, Cell>,
    markers: DashMap<String, Marker>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired buckets and markers to bound memory growth.
    ///
    /// Call periodically (e.g. every 5 minutes) from a maintenance task.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let before = self.counters.len() + self.markers.len();
        self.counters.retain(|_, cell| cell.expires_at > now);
        self.markers.retain(|_, marker| marker.expires_at > now);
        let after = self.counters.len() + self.markers.len();
        if before != after {
            debug!(purged = before - after, "purged expired counter buckets");
        }
    }

    /// Number of live buckets (diagnostics).
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let now = Instant::now();
        let ttl = key.window().ttl();
        // The entry guard holds the shard lock, so the read-modify-write
        // below is atomic with respect to concurrent increments.
        let mut cell = self.counters.entry(key.render()).or_insert_with(|| Cell {
            count: 0,
            expires_at: now + ttl,
        });
        if cell.expires_at <= now {
            cell.count = 0;
            cell.expires_at = now + ttl;
        }
        cell.count += 1;
        Ok(cell.count)
    }

    async fn get(&self, key: &CounterKey) -> Result<u64, StoreError> {
        let now = Instant::now();
        Ok(self
            .counters
            .get(&key.render())
            .filter(|cell| cell.expires_at > now)
            .map(|cell| cell.count)
            .unwrap_or(0))
    }

    async fn swap_marker(
        &self,
        scope: &str,
        value: i64,
        ttl: Duration,
    ) -> Result<Option<i64>, StoreError> {
        let now = Instant::now();
        let previous = self.markers.insert(
            scope.to_string(),
            Marker { value, expires_at: now + ttl },
        );
        Ok(previous
            .filter(|marker| marker.expires_at > now)
            .map(|marker| marker.value))
    }
}

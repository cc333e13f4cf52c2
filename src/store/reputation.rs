//! Reputation score store.
//!
//! Per-entity risk scores (0-100) that are only ever raised by the
//! engine. There is deliberately no lowering operation: reputation heals
//! by TTL expiry alone, so a flagged entity must behave long enough to
//! outlast the penalty window rather than washing the flag away with a
//! single good click.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::ReputationConfig;
use crate::error::StoreError;

/// The kinds of entities that carry a reputation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Device,
    Ip,
    DeviceFingerprint,
    IpFingerprint,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Device => "device",
            EntityKind::Ip => "ip",
            EntityKind::DeviceFingerprint => "device_fingerprint",
            EntityKind::IpFingerprint => "ip_fingerprint",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Monotonic reputation scores with per-kind TTLs.
///
/// `raise` must be atomic: concurrent raises on the same entity resolve
/// to the maximum candidate, never a lost update.
#[async_trait]
pub trait ReputationStore: Send + Sync {
    /// Current score for an entity. Unknown or expired entities score 0.
    async fn score(&self, kind: EntityKind, id: &str) -> Result<u8, StoreError>;

    /// Raise the score to at least `candidate` (clamped to 100) and reset
    /// the entity-kind TTL. Returns the stored score.
    async fn raise(&self, kind: EntityKind, id: &str, candidate: u8) -> Result<u8, StoreError>;
}

#[derive(Debug)]
struct Entry {
    score: u8,
    expires_at: Instant,
}

/// In-memory reputation store.
///
/// The DashMap entry guard makes `raise` an atomic read-max-write, which
/// is the strict-correctness variant of the usual get-then-set update.
#[derive(Debug)]
pub struct MemoryReputationStore {
    entries: DashMap<(EntityKind, String), Entry>,
    ttls: ReputationConfig,
}

impl MemoryReputationStore {
    pub fn new(ttls: ReputationConfig) -> Self {
        Self { entries: DashMap::new(), ttls }
    }

    /// Drop expired entries to bound memory growth.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    fn ttl(&self, kind: EntityKind) -> Duration {
        self.ttls.ttl(kind)
    }
}

impl Default for MemoryReputationStore {
    fn default() -> Self {
        Self::new(ReputationConfig::default())
    }
}

#[async_trait]
impl ReputationStore for MemoryReputationStore {
    async fn score(&self, kind: EntityKind, id: &str) -> Result<u8, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(&(kind, id.to_string()))
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.score)
            .unwrap_or(0))
    }

    async fn raise(&self, kind: EntityKind, id: &str, candidate: u8) -> Result<u8, StoreError> {
        let now = Instant::now();
        let candidate = candidate.min(100);
        let mut entry = self
            .entries
            .entry((kind, id.to_string()))
            .or_insert_with(|| Entry { score: 0, expires_at: now });
        if entry.expires_at <= now {
            entry.score = 0;
        }
        entry.score = entry.score.max(candidate);
        entry.expires_at = now + self.ttl(kind);
        Ok(entry.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_entity_scores_zero() {
        let store = MemoryReputationStore::default();
        assert_eq!(store.score(EntityKind::User, "nobody").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_raise_is_monotonic() {
        let store = MemoryReputationStore::default();

        assert_eq!(store.raise(EntityKind::Device, "d1", 60).await.unwrap(), 60);
        // A lower candidate never decreases the stored score.
        assert_eq!(store.raise(EntityKind::Device, "d1", 30).await.unwrap(), 60);
        assert_eq!(store.score(EntityKind::Device, "d1").await.unwrap(), 60);

        assert_eq!(store.raise(EntityKind::Device, "d1", 85).await.unwrap(), 85);
        assert_eq!(store.score(EntityKind::Device, "d1").await.unwrap(), 85);
    }

    #[tokio::test]
    async fn test_raise_clamps_to_100() {
        let store = MemoryReputationStore::default();
        assert_eq!(store.raise(EntityKind::Ip, "192.0.2.1", 255).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_kinds_are_isolated() {
        let store = MemoryReputationStore::default();
        store.raise(EntityKind::Device, "x", 70).await.unwrap();
        assert_eq!(store.score(EntityKind::Ip, "x").await.unwrap(), 0);
        assert_eq!(store.score(EntityKind::Device, "x").await.unwrap(), 70);
    }

    #[tokio::test]
    async fn test_concurrent_raises_keep_max() {
        use std::sync::Arc;

        let store = Arc::new(MemoryReputationStore::default());
        let mut tasks = Vec::new();
        for candidate in [10_u8, 95, 40, 70, 85, 25] {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.raise(EntityKind::User, "u1", candidate).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.score(EntityKind::User, "u1").await.unwrap(), 95);
    }
}

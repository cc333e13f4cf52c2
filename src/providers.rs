//! External collaborator contracts.
//!
//! The engine consumes these at its boundary: fingerprint/geo enrichment,
//! the recent-clicks query behind the pattern check, and the per-ad daily
//! engagement counters behind the CTR check. Hosts wire their real
//! providers in; the in-memory implementations back tests and local
//! development.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::event::{ClickEvent, Enrichment};
use crate::store::Window;

/// Fingerprinting/geo provider.
///
/// Enrichment must not fail the click path: a degraded provider returns
/// `Enrichment::default()` and the relevant checks lose precision instead
/// of blocking traffic.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    async fn enrich(&self, event: &ClickEvent) -> Enrichment;
}

/// Enricher that adds nothing. The engine then scores on counters and
/// reputation alone.
#[derive(Debug, Default)]
pub struct NoopEnricher;

#[async_trait]
impl ContextEnricher for NoopEnricher {
    async fn enrich(&self, _event: &ClickEvent) -> Enrichment {
        Enrichment::default()
    }
}

/// Recent click events by user, served by the analytics collaborator.
#[async_trait]
pub trait ClickHistory: Send + Sync {
    /// Timestamps (ms) of the user's clicks at or after `since_ms`,
    /// oldest first.
    async fn clicks_since(&self, user_id: &str, since_ms: i64) -> Result<Vec<i64>, StoreError>;
}

/// In-memory click history for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryClickHistory {
    clicks: DashMap<String, Vec<i64>>,
}

impl MemoryClickHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a click timestamp for a user.
    pub fn record(&self, user_id: &str, timestamp_ms: i64) {
        self.clicks.entry(user_id.to_string()).or_default().push(timestamp_ms);
    }
}

#[async_trait]
impl ClickHistory for MemoryClickHistory {
    async fn clicks_since(&self, user_id: &str, since_ms: i64) -> Result<Vec<i64>, StoreError> {
        let mut out: Vec<i64> = self
            .clicks
            .get(user_id)
            .map(|entry| entry.iter().copied().filter(|&ts| ts >= since_ms).collect())
            .unwrap_or_default();
        out.sort_unstable();
        Ok(out)
    }
}

/// Read-only daily impression/click counters per (user, ad), populated by
/// the ad-serving collaborator.
#[async_trait]
pub trait EngagementStats: Send + Sync {
    async fn impressions(
        &self,
        user_id: &str,
        ad_id: &str,
        day_start_ms: i64,
    ) -> Result<u64, StoreError>;

    async fn clicks(&self, user_id: &str, ad_id: &str, day_start_ms: i64)
    -> Result<u64, StoreError>;
}

/// In-memory engagement counters for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryEngagementStats {
    impressions: DashMap<String, u64>,
    clicks: DashMap<String, u64>,
}

fn engagement_key(user_id: &str, ad_id: &str, at_ms: i64) -> String {
    format!("{}:{}:{}", user_id, ad_id, Window::Day.floor(at_ms))
}

impl MemoryEngagementStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_impression(&self, user_id: &str, ad_id: &str, at_ms: i64) {
        *self.impressions.entry(engagement_key(user_id, ad_id, at_ms)).or_insert(0) += 1;
    }

    pub fn record_click(&self, user_id: &str, ad_id: &str, at_ms: i64) {
        *self.clicks.entry(engagement_key(user_id, ad_id, at_ms)).or_insert(0) += 1;
    }
}

#[async_trait]
impl EngagementStats for MemoryEngagementStats {
    async fn impressions(
        &self,
        user_id: &str,
        ad_id: &str,
        day_start_ms: i64,
    ) -> Result<u64, StoreError> {
        Ok(self
            .impressions
            .get(&engagement_key(user_id, ad_id, day_start_ms))
            .map(|count| *count)
            .unwrap_or(0))
    }

    async fn clicks(
        &self,
        user_id: &str,
        ad_id: &str,
        day_start_ms: i64,
    ) -> Result<u64, StoreError> {
        Ok(self
            .clicks
            .get(&engagement_key(user_id, ad_id, day_start_ms))
            .map(|count| *count)
            .unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_history_filters_and_orders() {
        let history = MemoryClickHistory::new();
        history.record("u1", 3_000);
        history.record("u1", 1_000);
        history.record("u1", 2_000);
        history.record("u2", 1_500);

        let clicks = history.clicks_since("u1", 2_000).await.unwrap();
        assert_eq!(clicks, vec![2_000, 3_000]);

        assert!(history.clicks_since("ghost", 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engagement_counters_scoped_by_day() {
        let stats = MemoryEngagementStats::new();
        let day_ms = Window::Day.len_ms();

        stats.record_impression("u1", "ad1", 100);
        stats.record_impression("u1", "ad1", 200);
        stats.record_click("u1", "ad1", 300);
        // Next day: separate bucket.
        stats.record_impression("u1", "ad1", day_ms + 100);

        assert_eq!(stats.impressions("u1", "ad1", 500).await.unwrap(), 2);
        assert_eq!(stats.clicks("u1", "ad1", 500).await.unwrap(), 1);
        assert_eq!(stats.impressions("u1", "ad1", day_ms + 500).await.unwrap(), 1);
    }
}

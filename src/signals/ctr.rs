//! CTR anomaly check: today's click-through rate for (user, ad).
//!
//! The impression and click counters are read-only here; they are
//! populated by the ad-serving collaborator.

use serde_json::{Map, json};

use super::{SignalEngine, SignalKind, SignalResult};
use crate::error::EngineError;
use crate::event::ClickEvent;
use crate::store::Window;

impl SignalEngine {
    pub(crate) async fn check_ctr(&self, event: &ClickEvent) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let day_start_ms = Window::Day.floor(event.timestamp_ms);

        let impressions = self
            .engagement
            .impressions(&event.user_id, &event.ad_id, day_start_ms)
            .await?;
        let clicks = self
            .engagement
            .clicks(&event.user_id, &event.ad_id, day_start_ms)
            .await?;

        let mut score = 0;
        let mut details = Map::new();

        if impressions > 0 && clicks > 0 {
            let ctr_pct = clicks as f64 / impressions as f64 * 100.0;
            if ctr_pct > thresholds.suspicious_ctr_pct {
                score = (ctr_pct / thresholds.suspicious_ctr_pct * 100.0)
                    .round()
                    .clamp(0.0, 100.0) as u8;
                details.insert("ctr_pct".into(), json!(ctr_pct));
                details.insert("impressions".into(), json!(impressions));
                details.insert("clicks".into(), json!(clicks));
                details.insert("threshold_pct".into(), json!(thresholds.suspicious_ctr_pct));
            }
        }

        Ok(SignalResult::scored(
            SignalKind::Ctr,
            score,
            "abnormal click-through rate",
            details,
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::config::Thresholds;
    use crate::providers::{MemoryClickHistory, MemoryEngagementStats};
    use crate::signals::SignalEngine;
    use crate::store::{MemoryCounterStore, MemoryReputationStore};
    use crate::test_support::click;

    fn engine_with_stats(engagement: Arc<MemoryEngagementStats>) -> SignalEngine {
        SignalEngine {
            counters: Arc::new(MemoryCounterStore::new()),
            reputation: Arc::new(MemoryReputationStore::default()),
            history: Arc::new(MemoryClickHistory::new()),
            engagement,
            thresholds: Arc::new(Thresholds::default()),
        }
    }

    const NOW: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_no_engagement_scores_zero() {
        let engine = engine_with_stats(Arc::new(MemoryEngagementStats::new()));
        let result = engine.check_ctr(&click("u1", NOW)).await.unwrap();
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_half_ctr_scores_max() {
        let stats = Arc::new(MemoryEngagementStats::new());
        for _ in 0..10 {
            stats.record_impression("u1", "ad-1", NOW);
        }
        for _ in 0..5 {
            stats.record_click("u1", "ad-1", NOW);
        }
        let engine = engine_with_stats(stats);

        // 50% CTR against a 20% threshold.
        let result = engine.check_ctr(&click("u1", NOW)).await.unwrap();
        assert_eq!(result.score, 100);
        assert_eq!(result.details["impressions"], 10);
        assert_eq!(result.details["clicks"], 5);
    }

    #[tokio::test]
    async fn test_normal_ctr_scores_zero() {
        let stats = Arc::new(MemoryEngagementStats::new());
        for _ in 0..100 {
            stats.record_impression("u1", "ad-1", NOW);
        }
        for _ in 0..5 {
            stats.record_click("u1", "ad-1", NOW);
        }
        let engine = engine_with_stats(stats);

        // 5% CTR is healthy.
        let result = engine.check_ctr(&click("u1", NOW)).await.unwrap();
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_clicks_without_impressions_score_zero() {
        let stats = Arc::new(MemoryEngagementStats::new());
        for _ in 0..3 {
            stats.record_click("u1", "ad-1", NOW);
        }
        let engine = engine_with_stats(stats);

        // No impression denominator: insufficient evidence, not fraud.
        let result = engine.check_ctr(&click("u1", NOW)).await.unwrap();
        assert_eq!(result.score, 0);
    }
}

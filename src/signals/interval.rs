//! Interval check: time since the user's previous click.

use serde_json::{Map, json};
use std::time::Duration;

use super::{SignalEngine, SignalKind, SignalResult};
use crate::error::EngineError;
use crate::event::ClickEvent;

/// Lifetime of the last-click stamp. A user idle for longer than this is
/// treated as having no previous click.
const LAST_CLICK_TTL: Duration = Duration::from_secs(60 * 60);

impl SignalEngine {
    pub(crate) async fn check_interval(
        &self,
        event: &ClickEvent,
    ) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let scope = format!("click:user:{}:last", event.user_id);

        // One atomic swap: store this click's stamp and read the previous
        // one, so concurrent clicks cannot observe a half-updated stamp.
        let previous = self
            .counters
            .swap_marker(&scope, event.timestamp_ms, LAST_CLICK_TTL)
            .await?;

        let mut score = 0;
        let mut details = Map::new();

        if let Some(last_click_ms) = previous {
            // Clamp to 1ms: a same-millisecond pair is the fastest
            // observable repeat and scores maximal.
            let delta_ms = (event.timestamp_ms - last_click_ms).max(1);
            if delta_ms < thresholds.min_click_interval_ms {
                let pct =
                    (thresholds.min_click_interval_ms as f64 / delta_ms as f64 * 100.0).round();
                score = pct.clamp(0.0, 100.0) as u8;
                details.insert("interval_ms".into(), json!(delta_ms));
                details.insert("threshold_ms".into(), json!(thresholds.min_click_interval_ms));
            }
        }

        Ok(SignalResult::scored(
            SignalKind::Interval,
            score,
            "clicks too close together",
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

    fn engine() -> SignalEngine {
        SignalEngine {
            counters: Arc::new(MemoryCounterStore::new()),
            reputation: Arc::new(MemoryReputationStore::default()),
            history: Arc::new(MemoryClickHistory::new()),
            engagement: Arc::new(MemoryEngagementStats::new()),
            thresholds: Arc::new(Thresholds::default()),
        }
    }

    #[tokio::test]
    async fn test_first_click_scores_zero() {
        let engine = engine();
        let result = engine.check_interval(&click("u1", 1_000_000)).await.unwrap();
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_rapid_second_click_scores_max() {
        let engine = engine();
        engine.check_interval(&click("u1", 1_000_000)).await.unwrap();

        // 100ms apart against a 500ms floor: round(500/100*100) capped.
        let result = engine.check_interval(&click("u1", 1_000_100)).await.unwrap();
        assert_eq!(result.score, 100);
        assert_eq!(result.details["interval_ms"], 100);
    }

    #[tokio::test]
    async fn test_graded_score_below_threshold() {
        let engine = engine();
        engine.check_interval(&click("u1", 1_000_000)).await.unwrap();

        // 400ms apart: round(500/400*100) = 125 -> capped to 100;
        // 450ms: round(500/450*100) = 111 -> capped. Anything under the
        // floor saturates, which is the intended bite of this signal.
        let result = engine.check_interval(&click("u1", 1_000_400)).await.unwrap();
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn test_slow_clicks_score_zero() {
        let engine = engine();
        engine.check_interval(&click("u1", 1_000_000)).await.unwrap();

        let result = engine.check_interval(&click("u1", 1_002_000)).await.unwrap();
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_same_millisecond_pair_scores_max() {
        let engine = engine();
        engine.check_interval(&click("u1", 1_000_000)).await.unwrap();

        let result = engine.check_interval(&click("u1", 1_000_000)).await.unwrap();
        assert_eq!(result.score, 100);
    }

    #[tokio::test]
    async fn test_users_independent() {
        let engine = engine();
        engine.check_interval(&click("u1", 1_000_000)).await.unwrap();

        let result = engine.check_interval(&click("u2", 1_000_050)).await.unwrap();
        assert_eq!(result.score, 0);
    }
}

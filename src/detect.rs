//! Fraud decision combiner.
//!
//! Runs the six signal checks concurrently and folds them into one
//! weighted verdict. Checks that score 0 are excluded from the average
//! rather than counted as innocence votes, so a single strong signal is
//! not diluted by five quiet ones.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::Thresholds;
use crate::event::ClickEvent;
use crate::metrics;
use crate::providers::{ClickHistory, EngagementStats};
use crate::signals::{SignalEngine, SignalKind, SignalResult, guard};
use crate::store::{CounterStore, ReputationStore};
use crate::telemetry::DetectTimer;

/// Verdict for one click: the weighted overall score, the reasons from
/// every contributing signal, and the per-signal results for audit.
#[derive(Debug, Clone, Serialize)]
pub struct FraudResult {
    pub fraudulent: bool,
    pub score: u8,
    pub reasons: Vec<String>,
    pub details: BTreeMap<SignalKind, SignalResult>,
}

impl FraudResult {
    /// Maximal-suspicion verdict for malformed input. Silently ignoring
    /// incomplete clicks would hand bots a blind spot.
    fn missing_data() -> Self {
        Self {
            fraudulent: true,
            score: 100,
            reasons: vec!["missing required data".to_string()],
            details: BTreeMap::new(),
        }
    }

}

/// Orchestrates the six signal checks into a single verdict.
pub struct FraudDetector {
    signals: SignalEngine,
    threshold: u8,
}

impl FraudDetector {
    pub fn new(
        counters: Arc<dyn CounterStore>,
        reputation: Arc<dyn ReputationStore>,
        history: Arc<dyn ClickHistory>,
        engagement: Arc<dyn EngagementStats>,
        thresholds: Thresholds,
    ) -> Self {
        let threshold = thresholds.fraud_score_threshold;
        Self {
            signals: SignalEngine {
                counters,
                reputation,
                history,
                engagement,
                thresholds: Arc::new(thresholds),
            },
            threshold,
        }
    }

    /// Score a click. Always returns a verdict: malformed input scores
    /// maximal, failed checks score neutral, and nothing escapes as an
    /// error.
    pub async fn detect(&self, event: &ClickEvent) -> FraudResult {
        let _timer = DetectTimer::new();

        if let Some(field) = event.missing_field() {
            warn!(field, ad = %event.ad_id, "click missing required data");
            let result = FraudResult::missing_data();
            metrics::record_fraud_score(result.score);
            return result;
        }

        let engine = &self.signals;
        let (frequency, interval, pattern, device, ip, ctr) = tokio::join!(
            guard(SignalKind::Frequency, engine.check_frequency(event)),
            guard(SignalKind::Interval, engine.check_interval(event)),
            guard(SignalKind::Pattern, engine.check_pattern(event)),
            guard(SignalKind::Device, engine.check_device(event)),
            guard(SignalKind::Ip, engine.check_ip(event)),
            guard(SignalKind::Ctr, engine.check_ctr(event)),
        );

        let result =
            self.combine([frequency, interval, pattern, device, ip, ctr]);

        if result.fraudulent {
            warn!(
                user = %event.user_id,
                ip = %event.ip,
                ad = %event.ad_id,
                score = result.score,
                reasons = ?result.reasons,
                "fraudulent click detected"
            );
        } else {
            debug!(user = %event.user_id, score = result.score, "click scored");
        }
        metrics::record_fraud_score(result.score);

        result
    }

    /// Weighted average restricted to contributing (score > 0) signals.
    fn combine(&self, results: [SignalResult; 6]) -> FraudResult {
        let mut reasons = Vec::new();
        let mut details = BTreeMap::new();
        let mut weighted_total = 0.0;
        let mut weight_sum = 0.0;

        for result in results {
            if result.score > 0 {
                reasons.push(result.reason.clone());
                weighted_total += result.score as f64 * result.weight;
                weight_sum += result.weight;
                details.insert(result.kind, result);
            }
        }

        // No contributing signal means no evidence, not a division by
        // zero.
        let score = if weight_sum > 0.0 {
            (weighted_total / weight_sum).round().clamp(0.0, 100.0) as u8
        } else {
            0
        };

        FraudResult {
            fraudulent: score >= self.threshold,
            score,
            reasons,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MemoryClickHistory, MemoryEngagementStats};
    use crate::store::{EntityKind, MemoryCounterStore, MemoryReputationStore};
    use crate::test_support::click;
    use serde_json::Map;

    fn detector() -> FraudDetector {
        FraudDetector::new(
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryReputationStore::default()),
            Arc::new(MemoryClickHistory::new()),
            Arc::new(MemoryEngagementStats::new()),
            Thresholds::default(),
        )
    }

    fn result(kind: SignalKind, score: u8) -> SignalResult {
        SignalResult::scored(kind, score, format!("{} triggered", kind), Map::new())
    }

    #[tokio::test]
    async fn test_missing_fields_score_maximal() {
        let detector = detector();
        for field in ["user_id", "device_id", "ip", "ad_id"] {
            let mut event = click("u1", 1_700_000_000_000);
            match field {
                "user_id" => event.user_id.clear(),
                "device_id" => event.device_id.clear(),
                "ip" => event.ip.clear(),
                _ => event.ad_id.clear(),
            }
            let verdict = detector.detect(&event).await;
            assert!(verdict.fraudulent, "{field} missing must be fraudulent");
            assert_eq!(verdict.score, 100);
            assert_eq!(verdict.reasons, vec!["missing required data"]);
        }
    }

    #[test]
    fn test_combine_excludes_quiet_signals() {
        let detector = detector();
        // Interval at 100 (weight 4) and ctr at 0: the quiet checks must
        // not drag the average down.
        let verdict = detector.combine([
            result(SignalKind::Frequency, 0),
            result(SignalKind::Interval, 100),
            result(SignalKind::Pattern, 0),
            result(SignalKind::Device, 0),
            result(SignalKind::Ip, 0),
            result(SignalKind::Ctr, 0),
        ]);
        assert_eq!(verdict.score, 100);
        assert!(verdict.fraudulent);
        assert_eq!(verdict.reasons.len(), 1);
        assert_eq!(verdict.details.len(), 1);
    }

    #[test]
    fn test_combine_weighted_average() {
        let detector = detector();
        // frequency 100 (w3) + device 40 (w2): (300 + 80) / 5 = 76.
        let verdict = detector.combine([
            result(SignalKind::Frequency, 100),
            result(SignalKind::Interval, 0),
            result(SignalKind::Pattern, 0),
            result(SignalKind::Device, 40),
            result(SignalKind::Ip, 0),
            result(SignalKind::Ctr, 0),
        ]);
        assert_eq!(verdict.score, 76);
        assert!(verdict.fraudulent);
    }

    #[test]
    fn test_combine_below_threshold_not_fraudulent() {
        let detector = detector();
        // device 40 (w2) + ctr 60 (w2): average 50, below 70.
        let verdict = detector.combine([
            result(SignalKind::Frequency, 0),
            result(SignalKind::Interval, 0),
            result(SignalKind::Pattern, 0),
            result(SignalKind::Device, 40),
            result(SignalKind::Ip, 0),
            result(SignalKind::Ctr, 60),
        ]);
        assert_eq!(verdict.score, 50);
        assert!(!verdict.fraudulent);
    }

    #[test]
    fn test_all_quiet_is_clean() {
        let detector = detector();
        let verdict = detector.combine([
            result(SignalKind::Frequency, 0),
            result(SignalKind::Interval, 0),
            result(SignalKind::Pattern, 0),
            result(SignalKind::Device, 0),
            result(SignalKind::Ip, 0),
            result(SignalKind::Ctr, 0),
        ]);
        assert_eq!(verdict.score, 0);
        assert!(!verdict.fraudulent);
        assert!(verdict.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_detect_reputation_only_actor() {
        // A device and IP both flagged at 100 cross the threshold on the
        // first observed click, despite the low first-click frequency
        // score diluting the average:
        // (20*3 + 100*2 + 100*3) / 8 = 70.
        let reputation = Arc::new(MemoryReputationStore::default());
        reputation.raise(EntityKind::Device, "device-1", 100).await.unwrap();
        reputation.raise(EntityKind::Ip, "192.0.2.10", 100).await.unwrap();

        let detector = FraudDetector::new(
            Arc::new(MemoryCounterStore::new()),
            reputation,
            Arc::new(MemoryClickHistory::new()),
            Arc::new(MemoryEngagementStats::new()),
            Thresholds::default(),
        );

        let event = click("u1", 1_700_000_000_000);
        let verdict = detector.detect(&event).await;
        assert_eq!(verdict.score, 70);
        assert!(verdict.fraudulent);
        assert!(verdict.details.contains_key(&SignalKind::Device));
        assert!(verdict.details.contains_key(&SignalKind::Ip));
    }
}

//! Click processing pipeline.
//!
//! The single entry point for the click-tracking handler: enrich the raw
//! click, score it, track fraud, and always hand back a decision.
//! Availability of ad serving outranks blocking any one suspicious
//! click, so every failure path resolves to `allowed = true` with the
//! error surfaced for observability.

use serde::Serialize;
use std::sync::Arc;
use tracing::{Instrument, debug};

use crate::activity::{ActivitySink, ActivityTracker, MemoryActivitySink};
use crate::config::EngineConfig;
use crate::detect::{FraudDetector, FraudResult};
use crate::error::StoreError;
use crate::event::ClickEvent;
use crate::metrics;
use crate::providers::{
    ClickHistory, ContextEnricher, EngagementStats, MemoryClickHistory, MemoryEngagementStats,
    NoopEnricher,
};
use crate::store::{
    CounterKey, CounterStore, Database, MemoryCounterStore, MemoryReputationStore,
    ReputationStore, Window,
};
use crate::telemetry::spans;

/// Scope names for the pipeline's own traffic counters.
const TRAFFIC_CLICKS: &str = "traffic:clicks";
const TRAFFIC_FRAUD: &str = "traffic:fraud";

/// Outcome of one click: whether to accept it, the full verdict, the
/// enriched event, and any non-fatal errors hit along the way.
#[derive(Debug, Clone, Serialize)]
pub struct ClickDecision {
    pub allowed: bool,
    pub fraud: FraudResult,
    pub event: ClickEvent,
    pub errors: Vec<String>,
}

/// Hour/day click totals and fraud rates.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrafficStats {
    pub clicks_hour: u64,
    pub clicks_day: u64,
    pub fraud_clicks_hour: u64,
    pub fraud_clicks_day: u64,
    pub fraud_rate_hour_pct: f64,
    pub fraud_rate_day_pct: f64,
}

/// The full click fraud engine: enrichment, detection, tracking.
pub struct ClickPipeline {
    enricher: Arc<dyn ContextEnricher>,
    detector: FraudDetector,
    tracker: ActivityTracker,
    counters: Arc<dyn CounterStore>,
}

impl ClickPipeline {
    pub fn new(
        config: EngineConfig,
        counters: Arc<dyn CounterStore>,
        reputation: Arc<dyn ReputationStore>,
        history: Arc<dyn ClickHistory>,
        engagement: Arc<dyn EngagementStats>,
        sink: Arc<dyn ActivitySink>,
        enricher: Arc<dyn ContextEnricher>,
    ) -> Self {
        let detector = FraudDetector::new(
            Arc::clone(&counters),
            Arc::clone(&reputation),
            Arc::clone(&history),
            Arc::clone(&engagement),
            config.thresholds.clone(),
        );
        let tracker = ActivityTracker::new(sink, reputation, history);
        Self { enricher, detector, tracker, counters }
    }

    /// Fully in-memory engine: no enrichment, no persistence. Useful for
    /// tests and local development.
    pub fn in_memory(config: EngineConfig) -> Self {
        let reputation_config = config.reputation.clone();
        Self::new(
            config,
            Arc::new(MemoryCounterStore::new()),
            Arc::new(MemoryReputationStore::new(reputation_config)),
            Arc::new(MemoryClickHistory::new()),
            Arc::new(MemoryEngagementStats::new()),
            Arc::new(MemoryActivitySink::new()),
            Arc::new(NoopEnricher),
        )
    }

    /// Build from configuration: reputation and activity records go to
    /// SQLite when `[database]` is configured, in-memory maps otherwise.
    ///
    /// Counters stay in memory either way (they live at most one day),
    /// and history/engagement/enrichment default to the local no-op
    /// providers; use [`ClickPipeline::new`] to inject real
    /// collaborators.
    pub async fn from_config(config: EngineConfig) -> Result<Self, StoreError> {
        let Some(db_config) = &config.database else {
            return Ok(Self::in_memory(config));
        };

        let db = Database::new(&db_config.path).await?;
        let reputation = Arc::new(db.reputation(config.reputation.clone()));
        let sink = Arc::new(db.activity_sink());
        Ok(Self::new(
            config,
            Arc::new(MemoryCounterStore::new()),
            reputation,
            Arc::new(MemoryClickHistory::new()),
            Arc::new(MemoryEngagementStats::new()),
            sink,
            Arc::new(NoopEnricher),
        ))
    }

    /// Access the tracker for flag queries and traffic analysis.
    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Process one click end to end. Never fails: the worst outcome is an
    /// allowed click with the errors listed in the decision.
    pub async fn process(&self, click: ClickEvent) -> ClickDecision {
        let span = spans::click(&click.user_id, &click.ad_id);
        self.process_inner(click).instrument(span).await
    }

    async fn process_inner(&self, mut click: ClickEvent) -> ClickDecision {
        metrics::record_click_processed();
        let mut errors = Vec::new();

        // Enrichment is infallible by contract; a degraded provider
        // returns an empty payload and the click continues unenriched.
        let enrichment = self.enricher.enrich(&click).await;
        click.apply(enrichment);

        self.bump_traffic(TRAFFIC_CLICKS, click.timestamp_ms, &mut errors).await;

        let fraud = self.detector.detect(&click).await;

        if fraud.fraudulent {
            metrics::record_click_blocked();
            if let Some(info) = &click.ip_info {
                if info.proxy {
                    metrics::record_flagged_network("proxy");
                }
                if info.vpn {
                    metrics::record_flagged_network("vpn");
                }
                if info.datacenter {
                    metrics::record_flagged_network("datacenter");
                }
            }
            self.bump_traffic(TRAFFIC_FRAUD, click.timestamp_ms, &mut errors).await;

            let outcome = self.tracker.track(&click, &fraud).await;
            errors.extend(outcome.errors);
        } else {
            debug!(user = %click.user_id, score = fraud.score, "click allowed");
        }

        ClickDecision {
            allowed: !fraud.fraudulent,
            fraud,
            event: click,
            errors,
        }
    }

    /// Click totals and fraud rates for the hour and day containing
    /// `now_ms`.
    pub async fn statistics(&self, now_ms: i64) -> Result<TrafficStats, StoreError> {
        let clicks_hour = self
            .counters
            .get(&CounterKey::new(TRAFFIC_CLICKS, Window::Hour, now_ms))
            .await?;
        let clicks_day = self
            .counters
            .get(&CounterKey::new(TRAFFIC_CLICKS, Window::Day, now_ms))
            .await?;
        let fraud_clicks_hour = self
            .counters
            .get(&CounterKey::new(TRAFFIC_FRAUD, Window::Hour, now_ms))
            .await?;
        let fraud_clicks_day = self
            .counters
            .get(&CounterKey::new(TRAFFIC_FRAUD, Window::Day, now_ms))
            .await?;

        let rate = |fraud: u64, total: u64| {
            if total == 0 { 0.0 } else { fraud as f64 / total as f64 * 100.0 }
        };

        Ok(TrafficStats {
            clicks_hour,
            clicks_day,
            fraud_clicks_hour,
            fraud_clicks_day,
            fraud_rate_hour_pct: rate(fraud_clicks_hour, clicks_hour),
            fraud_rate_day_pct: rate(fraud_clicks_day, clicks_day),
        })
    }

    /// Count a click in the hour and day traffic buckets, fail-soft.
    async fn bump_traffic(&self, scope: &str, at_ms: i64, errors: &mut Vec<String>) {
        for window in [Window::Hour, Window::Day] {
            let key = CounterKey::new(scope, window, at_ms);
            if let Err(error) = self.counters.increment(&key).await {
                debug!(scope, error = %error, "traffic counter unavailable");
                errors.push(format!("traffic counter: {error}"));
                // One failure means the sibling window will fail the same
                // way; don't double-report.
                break;
            }
        }
    }
}

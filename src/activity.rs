//! Suspicious activity tracking.
//!
//! Runs after a fraudulent verdict: classifies the activity, persists an
//! append-only record through the sink, and pushes the fraud score back
//! into the reputation store for every entity on the click. The two
//! writes are independent: each failure is logged and reported without
//! rolling back the other, and both are safe to retry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::detect::FraudResult;
use crate::error::StoreError;
use crate::event::ClickEvent;
use crate::metrics;
use crate::providers::ClickHistory;
use crate::signals::SignalKind;
use crate::store::{EntityKind, ReputationStore};

/// Categories of suspicious activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ClickFraud,
    ImpressionFraud,
    AbnormalTraffic,
    ProxyUsage,
    VpnUsage,
    DatacenterUsage,
    SuspiciousDevice,
    SuspiciousIp,
    SuspiciousUser,
    SuspiciousPattern,
}

impl ActivityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ActivityKind::ClickFraud => "click_fraud",
            ActivityKind::ImpressionFraud => "impression_fraud",
            ActivityKind::AbnormalTraffic => "abnormal_traffic",
            ActivityKind::ProxyUsage => "proxy_usage",
            ActivityKind::VpnUsage => "vpn_usage",
            ActivityKind::DatacenterUsage => "datacenter_usage",
            ActivityKind::SuspiciousDevice => "suspicious_device",
            ActivityKind::SuspiciousIp => "suspicious_ip",
            ActivityKind::SuspiciousUser => "suspicious_user",
            ActivityKind::SuspiciousPattern => "suspicious_pattern",
        }
    }

    /// Parse the stable string form back into a kind.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "click_fraud" => Some(ActivityKind::ClickFraud),
            "impression_fraud" => Some(ActivityKind::ImpressionFraud),
            "abnormal_traffic" => Some(ActivityKind::AbnormalTraffic),
            "proxy_usage" => Some(ActivityKind::ProxyUsage),
            "vpn_usage" => Some(ActivityKind::VpnUsage),
            "datacenter_usage" => Some(ActivityKind::DatacenterUsage),
            "suspicious_device" => Some(ActivityKind::SuspiciousDevice),
            "suspicious_ip" => Some(ActivityKind::SuspiciousIp),
            "suspicious_user" => Some(ActivityKind::SuspiciousUser),
            "suspicious_pattern" => Some(ActivityKind::SuspiciousPattern),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity bucket derived from the overall fraud score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Bucket a fraud score.
    pub const fn from_score(score: u8) -> Self {
        if score >= 90 {
            Severity::Critical
        } else if score >= 70 {
            Severity::High
        } else if score >= 50 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Parse the stable string form back into a severity.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only record of one suspicious activity. Never mutated after
/// creation; retained by the analytics store for historical querying.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub id: Uuid,
    pub kind: ActivityKind,
    pub severity: Severity,
    pub user_id: String,
    pub device_id: String,
    pub ip: String,
    pub ad_id: String,
    pub score: u8,
    pub reasons: Vec<String>,
    pub details: Value,
    pub recorded_at: DateTime<Utc>,
}

/// Destination for activity records (analytics store, queue, ...).
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn save(&self, record: &ActivityRecord) -> Result<(), StoreError>;
}

/// In-memory sink for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct MemoryActivitySink {
    records: RwLock<Vec<ActivityRecord>>,
}

impl MemoryActivitySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<ActivityRecord> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl ActivitySink for MemoryActivitySink {
    async fn save(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        self.records.write().push(record.clone());
        Ok(())
    }
}

/// Result of one tracking pass. `errors` lists non-fatal write failures
/// for observability; the verdict that triggered tracking is unaffected.
#[derive(Debug)]
pub struct TrackOutcome {
    pub record: ActivityRecord,
    pub errors: Vec<String>,
}

/// Traffic pattern analysis over the last 24 hours of one user's clicks.
#[derive(Debug, Clone, Serialize)]
pub struct TrafficAnalysis {
    pub event_count: usize,
    pub events_per_hour: f64,
    pub interval_std_dev_ms: f64,
    pub frequency_suspicious: bool,
    pub pattern_suspicious: bool,
    pub suspicious: bool,
}

/// Persists suspicious activity and feeds verdicts back into reputation.
pub struct ActivityTracker {
    sink: Arc<dyn ActivitySink>,
    reputation: Arc<dyn ReputationStore>,
    history: Arc<dyn ClickHistory>,
}

impl ActivityTracker {
    pub fn new(
        sink: Arc<dyn ActivitySink>,
        reputation: Arc<dyn ReputationStore>,
        history: Arc<dyn ClickHistory>,
    ) -> Self {
        Self { sink, reputation, history }
    }

    /// Record a fraudulent click: classify, persist, raise reputation.
    ///
    /// Only call for fraudulent verdicts; activity logging is bounded to
    /// confirmed fraud to cap storage growth.
    pub async fn track(&self, event: &ClickEvent, fraud: &FraudResult) -> TrackOutcome {
        let kind = classify(fraud);
        let severity = Severity::from_score(fraud.score);

        let record = ActivityRecord {
            id: Uuid::new_v4(),
            kind,
            severity,
            user_id: event.user_id.clone(),
            device_id: event.device_id.clone(),
            ip: event.ip.clone(),
            ad_id: event.ad_id.clone(),
            score: fraud.score,
            reasons: fraud.reasons.clone(),
            details: serde_json::to_value(&fraud.details).unwrap_or(Value::Null),
            recorded_at: Utc::now(),
        };

        metrics::record_activity(kind.as_str(), severity.as_str());
        if severity >= Severity::High {
            warn!(
                kind = %kind,
                severity = %severity,
                user = %record.user_id,
                ip = %record.ip,
                score = record.score,
                "suspicious activity alert"
            );
        } else {
            debug!(kind = %kind, severity = %severity, user = %record.user_id, "suspicious activity recorded");
        }

        let mut errors = Vec::new();

        if let Err(error) = self.sink.save(&record).await {
            warn!(error = %error, id = %record.id, "failed to persist activity record");
            errors.push(format!("activity persistence: {error}"));
        }

        self.raise_all(event, fraud.score, &mut errors).await;

        TrackOutcome { record, errors }
    }

    /// Raise reputation for every entity on the click, using the overall
    /// fraud score as the candidate.
    async fn raise_all(&self, event: &ClickEvent, score: u8, errors: &mut Vec<String>) {
        let mut targets: Vec<(EntityKind, &str)> = vec![
            (EntityKind::User, event.user_id.as_str()),
            (EntityKind::Device, event.device_id.as_str()),
            (EntityKind::Ip, event.ip.as_str()),
        ];
        if let Some(fingerprint) = &event.device_fingerprint {
            targets.push((EntityKind::DeviceFingerprint, fingerprint));
        }
        if let Some(fingerprint) = &event.ip_fingerprint {
            targets.push((EntityKind::IpFingerprint, fingerprint));
        }

        for (kind, id) in targets {
            match self.reputation.raise(kind, id, score).await {
                Ok(stored) => {
                    metrics::record_reputation_raised(kind.as_str());
                    debug!(entity = %kind, id = %id, score = stored, "reputation raised");
                }
                Err(error) => {
                    warn!(entity = %kind, id = %id, error = %error, "failed to raise reputation");
                    errors.push(format!("reputation {kind}: {error}"));
                }
            }
        }
    }

    /// Whether an entity's reputation meets a caller-supplied threshold.
    ///
    /// Callers layer their own policy on the raw score (e.g. block at 80,
    /// challenge at 50); the engine has no terminal "banned" state.
    pub async fn is_flagged(
        &self,
        kind: EntityKind,
        id: &str,
        threshold: u8,
    ) -> Result<bool, StoreError> {
        Ok(self.reputation.score(kind, id).await? >= threshold)
    }

    /// Analyze the last 24 hours of a user's click traffic for volume and
    /// regularity anomalies.
    pub async fn analyze_traffic(
        &self,
        user_id: &str,
        now_ms: i64,
    ) -> Result<TrafficAnalysis, StoreError> {
        const DAY_MS: i64 = 24 * 60 * 60 * 1000;
        let events = self.history.clicks_since(user_id, now_ms - DAY_MS).await?;

        let intervals: Vec<f64> = events
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) as f64)
            .collect();

        let interval_std_dev_ms = if intervals.is_empty() {
            0.0
        } else {
            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            let variance = intervals
                .iter()
                .map(|interval| (interval - mean).powi(2))
                .sum::<f64>()
                / intervals.len() as f64;
            variance.sqrt()
        };

        let events_per_hour = events.len() as f64 / 24.0;
        let frequency_suspicious = events_per_hour > 10.0;
        let pattern_suspicious = intervals.len() >= 5 && interval_std_dev_ms < 1000.0;

        Ok(TrafficAnalysis {
            event_count: events.len(),
            events_per_hour,
            interval_std_dev_ms,
            frequency_suspicious,
            pattern_suspicious,
            suspicious: frequency_suspicious || pattern_suspicious,
        })
    }
}

/// Pick the activity category from the dominant signal.
///
/// Network intelligence outranks behavioral signals: a datacenter click
/// is "datacenter usage" even when the pattern check also fired.
fn classify(fraud: &FraudResult) -> ActivityKind {
    if let Some(ip) = fraud.details.get(&SignalKind::Ip) {
        if ip.details.get("proxy").and_then(Value::as_bool) == Some(true) {
            return ActivityKind::ProxyUsage;
        }
        if ip.details.get("vpn").and_then(Value::as_bool) == Some(true) {
            return ActivityKind::VpnUsage;
        }
        if ip.details.get("datacenter").and_then(Value::as_bool) == Some(true) {
            return ActivityKind::DatacenterUsage;
        }
    }
    if fraud.details.get(&SignalKind::Pattern).is_some_and(|r| r.score > 0) {
        return ActivityKind::SuspiciousPattern;
    }
    if fraud.details.get(&SignalKind::Device).is_some_and(|r| r.score > 0) {
        return ActivityKind::SuspiciousDevice;
    }
    if fraud.details.get(&SignalKind::Ip).is_some_and(|r| r.score > 0) {
        return ActivityKind::SuspiciousIp;
    }
    ActivityKind::ClickFraud
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::MemoryClickHistory;
    use crate::signals::SignalResult;
    use crate::store::MemoryReputationStore;
    use crate::test_support::click;
    use serde_json::{Map, json};
    use std::collections::BTreeMap;

    /// Sink that always fails, for write-independence tests.
    struct FailingSink;

    #[async_trait]
    impl ActivitySink for FailingSink {
        async fn save(&self, _record: &ActivityRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("sink offline".into()))
        }
    }

    fn fraud_with(details: BTreeMap<SignalKind, SignalResult>, score: u8) -> FraudResult {
        FraudResult {
            fraudulent: true,
            score,
            reasons: vec!["test".into()],
            details,
        }
    }

    fn signal(kind: SignalKind, score: u8, detail_flags: &[&str]) -> SignalResult {
        let mut details = Map::new();
        for flag in detail_flags {
            details.insert((*flag).to_string(), json!(true));
        }
        SignalResult::scored(kind, score, "test", details)
    }

    #[test]
    fn test_severity_bucket_edges() {
        assert_eq!(Severity::from_score(0), Severity::Low);
        assert_eq!(Severity::from_score(49), Severity::Low);
        assert_eq!(Severity::from_score(50), Severity::Medium);
        assert_eq!(Severity::from_score(69), Severity::Medium);
        assert_eq!(Severity::from_score(70), Severity::High);
        assert_eq!(Severity::from_score(89), Severity::High);
        assert_eq!(Severity::from_score(90), Severity::Critical);
        assert_eq!(Severity::from_score(100), Severity::Critical);
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            ActivityKind::ClickFraud,
            ActivityKind::ProxyUsage,
            ActivityKind::SuspiciousPattern,
            ActivityKind::AbnormalTraffic,
        ] {
            assert_eq!(ActivityKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ActivityKind::parse("nonsense"), None);
        assert_eq!(Severity::parse("critical"), Some(Severity::Critical));
    }

    #[test]
    fn test_classification_precedence() {
        // Network flags outrank everything.
        let mut details = BTreeMap::new();
        details.insert(SignalKind::Ip, signal(SignalKind::Ip, 90, &["datacenter"]));
        details.insert(SignalKind::Pattern, signal(SignalKind::Pattern, 80, &[]));
        assert_eq!(classify(&fraud_with(details, 90)), ActivityKind::DatacenterUsage);

        // Proxy outranks vpn and datacenter when all are present.
        let mut details = BTreeMap::new();
        details.insert(
            SignalKind::Ip,
            signal(SignalKind::Ip, 90, &["proxy", "vpn", "datacenter"]),
        );
        assert_eq!(classify(&fraud_with(details, 90)), ActivityKind::ProxyUsage);

        // Pattern outranks device and plain ip.
        let mut details = BTreeMap::new();
        details.insert(SignalKind::Pattern, signal(SignalKind::Pattern, 80, &[]));
        details.insert(SignalKind::Device, signal(SignalKind::Device, 70, &[]));
        details.insert(SignalKind::Ip, signal(SignalKind::Ip, 60, &[]));
        assert_eq!(classify(&fraud_with(details, 80)), ActivityKind::SuspiciousPattern);

        // Plain rate-limited ip without flags.
        let mut details = BTreeMap::new();
        details.insert(SignalKind::Ip, signal(SignalKind::Ip, 75, &[]));
        assert_eq!(classify(&fraud_with(details, 75)), ActivityKind::SuspiciousIp);

        // Nothing dominant: generic click fraud.
        let mut details = BTreeMap::new();
        details.insert(SignalKind::Frequency, signal(SignalKind::Frequency, 100, &[]));
        assert_eq!(classify(&fraud_with(details, 85)), ActivityKind::ClickFraud);
    }

    #[tokio::test]
    async fn test_track_persists_and_raises() {
        let sink = Arc::new(MemoryActivitySink::new());
        let reputation = Arc::new(MemoryReputationStore::default());
        let tracker = ActivityTracker::new(
            Arc::clone(&sink) as _,
            Arc::clone(&reputation) as _,
            Arc::new(MemoryClickHistory::new()),
        );

        let mut event = click("u1", 1_700_000_000_000);
        event.device_fingerprint = Some("fp-d".into());
        event.ip_fingerprint = Some("fp-i".into());

        let fraud = fraud_with(BTreeMap::new(), 85);
        let outcome = tracker.track(&event, &fraud).await;

        assert!(outcome.errors.is_empty());
        assert_eq!(sink.len(), 1);
        assert_eq!(outcome.record.severity, Severity::High);

        use crate::store::ReputationStore;
        for (kind, id) in [
            (EntityKind::User, "u1"),
            (EntityKind::Device, "device-1"),
            (EntityKind::Ip, "192.0.2.10"),
            (EntityKind::DeviceFingerprint, "fp-d"),
            (EntityKind::IpFingerprint, "fp-i"),
        ] {
            assert_eq!(reputation.score(kind, id).await.unwrap(), 85, "{kind} not raised");
        }
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_block_reputation() {
        let reputation = Arc::new(MemoryReputationStore::default());
        let tracker = ActivityTracker::new(
            Arc::new(FailingSink),
            Arc::clone(&reputation) as _,
            Arc::new(MemoryClickHistory::new()),
        );

        let event = click("u1", 1_700_000_000_000);
        let outcome = tracker.track(&event, &fraud_with(BTreeMap::new(), 92)).await;

        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("activity persistence"));

        use crate::store::ReputationStore;
        assert_eq!(reputation.score(EntityKind::User, "u1").await.unwrap(), 92);
    }

    #[tokio::test]
    async fn test_is_flagged_threshold() {
        let reputation = Arc::new(MemoryReputationStore::default());
        let tracker = ActivityTracker::new(
            Arc::new(MemoryActivitySink::new()),
            Arc::clone(&reputation) as _,
            Arc::new(MemoryClickHistory::new()),
        );

        use crate::store::ReputationStore;
        reputation.raise(EntityKind::Ip, "192.0.2.1", 60).await.unwrap();

        assert!(tracker.is_flagged(EntityKind::Ip, "192.0.2.1", 50).await.unwrap());
        assert!(!tracker.is_flagged(EntityKind::Ip, "192.0.2.1", 80).await.unwrap());
        assert!(!tracker.is_flagged(EntityKind::User, "unknown", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_analyze_traffic_flags_regular_flood() {
        let history = Arc::new(MemoryClickHistory::new());
        let now = 10_000_000_i64;
        // 260 clicks, exactly 1s apart: both flags fire.
        for n in 0..260 {
            history.record("u1", now - 260_000 + n * 1_000);
        }
        let tracker = ActivityTracker::new(
            Arc::new(MemoryActivitySink::new()),
            Arc::new(MemoryReputationStore::default()),
            Arc::clone(&history) as _,
        );

        let analysis = tracker.analyze_traffic("u1", now).await.unwrap();
        assert_eq!(analysis.event_count, 260);
        assert!(analysis.frequency_suspicious);
        assert!(analysis.pattern_suspicious);
        assert!(analysis.suspicious);
    }

    #[tokio::test]
    async fn test_analyze_traffic_quiet_user() {
        let tracker = ActivityTracker::new(
            Arc::new(MemoryActivitySink::new()),
            Arc::new(MemoryReputationStore::default()),
            Arc::new(MemoryClickHistory::new()),
        );

        let analysis = tracker.analyze_traffic("ghost", 10_000_000).await.unwrap();
        assert_eq!(analysis.event_count, 0);
        assert!(!analysis.suspicious);
    }
}

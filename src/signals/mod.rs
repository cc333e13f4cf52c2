//! Fraud signal checks.
//!
//! Six independent evaluators, each consuming the counter store, the
//! reputation store, or a collaborator query, and each producing a
//! normalized [`SignalResult`]. Checks are side-effect-isolated (they only
//! increment their own counters) and carry no ordering dependency, so the
//! combiner runs them concurrently.
//!
//! Any check failure is absorbed by [`guard`]: the combiner never sees an
//! error, only a zero-score result tagged with the failure.

mod ctr;
mod device;
mod frequency;
mod interval;
mod ip;
mod pattern;

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::config::Thresholds;
use crate::error::EngineError;
use crate::metrics;
use crate::providers::{ClickHistory, EngagementStats};
use crate::store::{CounterStore, ReputationStore};

/// The fixed set of fraud signals.
///
/// Adding a signal means adding a variant here, which forces every match
/// (weight table, combiner fan-out, classification) to be revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Frequency,
    Interval,
    Pattern,
    Device,
    Ip,
    Ctr,
}

impl SignalKind {
    /// Evaluation (and reporting) order of the checks.
    pub const ALL: [SignalKind; 6] = [
        SignalKind::Frequency,
        SignalKind::Interval,
        SignalKind::Pattern,
        SignalKind::Device,
        SignalKind::Ip,
        SignalKind::Ctr,
    ];

    /// Weight of this signal in the overall score.
    ///
    /// Tight click timing is the strongest bot indicator, hence the
    /// heaviest weight on the interval check.
    pub const fn weight(self) -> f64 {
        match self {
            SignalKind::Frequency => 3.0,
            SignalKind::Interval => 4.0,
            SignalKind::Pattern => 2.0,
            SignalKind::Device => 2.0,
            SignalKind::Ip => 3.0,
            SignalKind::Ctr => 2.0,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            SignalKind::Frequency => "frequency",
            SignalKind::Interval => "interval",
            SignalKind::Pattern => "pattern",
            SignalKind::Device => "device",
            SignalKind::Ip => "ip",
            SignalKind::Ctr => "ctr",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of one signal check: a 0-100 suspicion score with its fixed
/// weight, a human-readable reason, and the raw numbers behind the score
/// for audit.
#[derive(Debug, Clone, Serialize)]
pub struct SignalResult {
    pub kind: SignalKind,
    pub score: u8,
    pub weight: f64,
    pub reason: String,
    pub details: Map<String, Value>,
}

impl SignalResult {
    /// Build a result; the weight always comes from the signal table.
    pub fn scored(
        kind: SignalKind,
        score: u8,
        reason: impl Into<String>,
        details: Map<String, Value>,
    ) -> Self {
        Self {
            kind,
            score: score.min(100),
            weight: kind.weight(),
            reason: reason.into(),
            details,
        }
    }

    /// Zero-score substitute for a failed check. The error lands in the
    /// details so the degradation stays visible in audit output.
    pub fn degraded(kind: SignalKind, error: &EngineError) -> Self {
        let mut details = Map::new();
        details.insert("error".to_string(), Value::String(error.to_string()));
        Self::scored(kind, 0, format!("error in {} check", kind), details)
    }
}

/// Run a check fail-soft: any error becomes a zero-score result.
///
/// This is the single place infrastructure failures are converted into
/// "can't tell", so the combiner's aggregation needs no error branches.
pub(crate) async fn guard<F>(kind: SignalKind, check: F) -> SignalResult
where
    F: Future<Output = Result<SignalResult, EngineError>>,
{
    match check.await {
        Ok(result) => result,
        Err(error) => {
            warn!(signal = kind.as_str(), error = %error, "signal check degraded to neutral");
            metrics::record_signal_error(kind.as_str(), error.error_code());
            SignalResult::degraded(kind, &error)
        }
    }
}

/// Shared dependencies of the six checks.
pub(crate) struct SignalEngine {
    pub(crate) counters: Arc<dyn CounterStore>,
    pub(crate) reputation: Arc<dyn ReputationStore>,
    pub(crate) history: Arc<dyn ClickHistory>,
    pub(crate) engagement: Arc<dyn EngagementStats>,
    pub(crate) thresholds: Arc<Thresholds>,
}

/// Counter score: how far past (or toward) a rate threshold the count is.
///
/// `min(100, round(count / threshold * 100))`, so reaching the threshold
/// saturates at 100 and lower counts grade linearly toward it.
pub(crate) fn ratio_score(count: u64, threshold: u64) -> u8 {
    let threshold = threshold.max(1);
    let pct = (count as f64 / threshold as f64 * 100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

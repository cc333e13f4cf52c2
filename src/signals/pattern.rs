//! Pattern check: regularity of the user's recent click timing.
//!
//! Humans click with jitter; automation clicks on a schedule. A low
//! standard deviation over a short mean interval is the signature of a
//! timer loop.

use serde_json::{Map, json};

use super::{SignalEngine, SignalKind, SignalResult};
use crate::error::EngineError;
use crate::event::ClickEvent;

impl SignalEngine {
    pub(crate) async fn check_pattern(
        &self,
        event: &ClickEvent,
    ) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let since_ms = event.timestamp_ms - thresholds.pattern_window_ms;
        let clicks = self.history.clicks_since(&event.user_id, since_ms).await?;

        let mut score = 0;
        let mut details = Map::new();

        // Fewer than the minimum samples is "insufficient evidence", not
        // "innocent": the score stays 0 and the signal stays out of the
        // weighted average entirely.
        if clicks.len() >= self.thresholds.pattern_min_samples {
            let intervals: Vec<f64> = clicks
                .windows(2)
                .map(|pair| (pair[1] - pair[0]) as f64)
                .collect();

            let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
            let variance = intervals
                .iter()
                .map(|interval| (interval - mean).powi(2))
                .sum::<f64>()
                / intervals.len() as f64;
            let std_dev = variance.sqrt();

            if std_dev < thresholds.pattern_max_std_dev_ms && mean < thresholds.pattern_max_mean_ms
            {
                // Perfectly regular timing divides by ~zero; that is the
                // most suspicious case, so it pins to 100.
                score = if std_dev <= f64::EPSILON {
                    100
                } else {
                    (thresholds.pattern_max_std_dev_ms / std_dev * 50.0)
                        .round()
                        .clamp(0.0, 100.0) as u8
                };
                details.insert("std_dev_ms".into(), json!(std_dev));
                details.insert("mean_ms".into(), json!(mean));
                details.insert("click_count".into(), json!(clicks.len()));
            }
        }

        Ok(SignalResult::scored(
            SignalKind::Pattern,
            score,
            "bot-like click regularity",
            details,
        ))
    }
}

//! Device reputation check: device click rate plus stored reputation for
//! the device id and its fingerprint.

use serde_json::{Map, json};

use super::{SignalEngine, SignalKind, SignalResult, ratio_score};
use crate::error::EngineError;
use crate::event::ClickEvent;
use crate::store::{CounterKey, EntityKind, Window};

impl SignalEngine {
    pub(crate) async fn check_device(
        &self,
        event: &ClickEvent,
    ) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let mut details = Map::new();

        let device_hour = CounterKey::new(
            format!("click:device:{}", event.device_id),
            Window::Hour,
            event.timestamp_ms,
        );
        let device_hour_clicks = self.counters.increment(&device_hour).await?;
        let mut score = ratio_score(device_hour_clicks, thresholds.max_clicks_per_device_hour);
        details.insert("device_hour_clicks".into(), json!(device_hour_clicks));
        details.insert(
            "device_hour_threshold".into(),
            json!(thresholds.max_clicks_per_device_hour),
        );

        let reputation = self.reputation.score(EntityKind::Device, &event.device_id).await?;
        if reputation > 0 {
            score = score.max(reputation);
            details.insert("reputation_score".into(), json!(reputation));
        }

        if let Some(fingerprint) = &event.device_fingerprint {
            let fp_reputation = self
                .reputation
                .score(EntityKind::DeviceFingerprint, fingerprint)
                .await?;
            if fp_reputation > 0 {
                score = score.max(fp_reputation);
                details.insert("fingerprint_reputation_score".into(), json!(fp_reputation));
            }

            // The fingerprint counter catches device-id rotation: many
            // "different" devices collapsing onto one fingerprint.
            let fingerprint_hour = CounterKey::new(
                format!("click:device:fp:{}", fingerprint),
                Window::Hour,
                event.timestamp_ms,
            );
            let fingerprint_hour_clicks = self.counters.increment(&fingerprint_hour).await?;
            let fp_score =
                ratio_score(fingerprint_hour_clicks, thresholds.max_clicks_per_device_hour);
            if fp_score > score {
                score = fp_score;
            }
            details.insert("fingerprint_hour_clicks".into(), json!(fingerprint_hour_clicks));
        }

        Ok(SignalResult::scored(SignalKind::Device, score, "suspicious device", details))
    }
}

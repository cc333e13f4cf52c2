//! Frequency check: clicks per user per hour and per (user, ad) per day.

use serde_json::{Map, json};

use super::{SignalEngine, SignalKind, SignalResult, ratio_score};
use crate::error::EngineError;
use crate::event::ClickEvent;
use crate::store::{CounterKey, Window};

impl SignalEngine {
    pub(crate) async fn check_frequency(
        &self,
        event: &ClickEvent,
    ) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let mut details = Map::new();

        let user_hour = CounterKey::new(
            format!("click:user:{}", event.user_id),
            Window::Hour,
            event.timestamp_ms,
        );
        let user_hour_clicks = self.counters.increment(&user_hour).await?;
        let mut score = ratio_score(user_hour_clicks, thresholds.max_clicks_per_user_hour);
        details.insert("user_hour_clicks".into(), json!(user_hour_clicks));
        details.insert("user_hour_threshold".into(), json!(thresholds.max_clicks_per_user_hour));

        let user_ad_day = CounterKey::new(
            format!("click:user:{}:ad:{}", event.user_id, event.ad_id),
            Window::Day,
            event.timestamp_ms,
        );
        let user_ad_day_clicks = self.counters.increment(&user_ad_day).await?;
        let day_score = ratio_score(user_ad_day_clicks, thresholds.max_clicks_per_ad_user_day);
        score = score.max(day_score);
        details.insert("user_ad_day_clicks".into(), json!(user_ad_day_clicks));
        details.insert(
            "user_ad_day_threshold".into(),
            json!(thresholds.max_clicks_per_ad_user_day),
        );

        Ok(SignalResult::scored(
            SignalKind::Frequency,
            score,
            "excessive click frequency",
            details,
        ))
    }
}

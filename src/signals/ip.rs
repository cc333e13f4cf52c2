//! IP reputation check: source address click rate, stored reputation, and
//! network intelligence floors for proxy/VPN/datacenter traffic.

use serde_json::{Map, json};

use super::{SignalEngine, SignalKind, SignalResult, ratio_score};
use crate::error::EngineError;
use crate::event::ClickEvent;
use crate::store::{CounterKey, EntityKind, Window};

/// Minimum scores forced by network intelligence. Datacenter ranges have
/// no business clicking ads, so they sit just below certainty.
const PROXY_FLOOR: u8 = 70;
const VPN_FLOOR: u8 = 80;
const DATACENTER_FLOOR: u8 = 90;

impl SignalEngine {
    pub(crate) async fn check_ip(&self, event: &ClickEvent) -> Result<SignalResult, EngineError> {
        let thresholds = &self.thresholds;
        let mut details = Map::new();
        let mut reason = "suspicious ip address";

        let ip_hour = CounterKey::new(
            format!("click:ip:{}", event.ip),
            Window::Hour,
            event.timestamp_ms,
        );
        let ip_hour_clicks = self.counters.increment(&ip_hour).await?;
        let mut score = ratio_score(ip_hour_clicks, thresholds.max_clicks_per_ip_hour);
        details.insert("ip_hour_clicks".into(), json!(ip_hour_clicks));
        details.insert("ip_hour_threshold".into(), json!(thresholds.max_clicks_per_ip_hour));

        let reputation = self.reputation.score(EntityKind::Ip, &event.ip).await?;
        if reputation > 0 {
            score = score.max(reputation);
            details.insert("reputation_score".into(), json!(reputation));
        }

        if let Some(fingerprint) = &event.ip_fingerprint {
            let fp_reputation =
                self.reputation.score(EntityKind::IpFingerprint, fingerprint).await?;
            if fp_reputation > 0 {
                score = score.max(fp_reputation);
                details.insert("fingerprint_reputation_score".into(), json!(fp_reputation));
            }
        }

        if let Some(info) = &event.ip_info {
            if info.proxy {
                score = score.max(PROXY_FLOOR);
                details.insert("proxy".into(), json!(true));
                reason = "proxy detected";
            }
            if info.vpn {
                score = score.max(VPN_FLOOR);
                details.insert("vpn".into(), json!(true));
                reason = "vpn detected";
            }
            if info.datacenter {
                score = score.max(DATACENTER_FLOOR);
                details.insert("datacenter".into(), json!(true));
                reason = "datacenter ip detected";
            }
        }

        Ok(SignalResult::scored(SignalKind::Ip, score, reason, details))
    }
}

//! Click event types.
//!
//! A [`ClickEvent`] is the immutable input to one detection pass. The
//! caller owns it for the duration of the call; the engine never mutates
//! a click after enrichment.

use serde::{Deserialize, Serialize};

/// Network intelligence attached to a click by the geo/fingerprint provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpInfo {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    /// Request arrived through a known proxy.
    #[serde(default)]
    pub proxy: bool,
    /// Request arrived through a known VPN exit.
    #[serde(default)]
    pub vpn: bool,
    /// Source address belongs to a datacenter range.
    #[serde(default)]
    pub datacenter: bool,
}

/// A reported ad click, as received from the tracking handler.
///
/// `user_id`, `device_id`, `ip`, and `ad_id` are required; an empty value
/// is treated as missing and short-circuits detection to a maximal
/// verdict. `timestamp_ms` is the click time in epoch milliseconds and is
/// the time source for all window and interval math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickEvent {
    pub user_id: String,
    pub device_id: String,
    pub ip: String,
    pub ad_id: String,
    pub timestamp_ms: i64,
    #[serde(default)]
    pub device_fingerprint: Option<String>,
    #[serde(default)]
    pub ip_fingerprint: Option<String>,
    #[serde(default)]
    pub ip_info: Option<IpInfo>,
}

impl ClickEvent {
    /// Create a click with the required identifiers only.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        ip: impl Into<String>,
        ad_id: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            ip: ip.into(),
            ad_id: ad_id.into(),
            timestamp_ms,
            device_fingerprint: None,
            ip_fingerprint: None,
            ip_info: None,
        }
    }

    /// Name of the first missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.user_id.is_empty() {
            Some("user_id")
        } else if self.device_id.is_empty() {
            Some("device_id")
        } else if self.ip.is_empty() {
            Some("ip")
        } else if self.ad_id.is_empty() {
            Some("ad_id")
        } else {
            None
        }
    }

    /// Merge enrichment data into the click, preferring provider values.
    pub(crate) fn apply(&mut self, enrichment: Enrichment) {
        if enrichment.device_fingerprint.is_some() {
            self.device_fingerprint = enrichment.device_fingerprint;
        }
        if enrichment.ip_fingerprint.is_some() {
            self.ip_fingerprint = enrichment.ip_fingerprint;
        }
        if enrichment.ip_info.is_some() {
            self.ip_info = enrichment.ip_info;
        }
    }
}

/// Enrichment payload produced by the fingerprinting/geo collaborator.
///
/// Fields left as `None` leave the click unchanged, so a degraded
/// provider can return `Enrichment::default()`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Enrichment {
    pub device_fingerprint: Option<String>,
    pub ip_fingerprint: Option<String>,
    pub ip_info: Option<IpInfo>,
}

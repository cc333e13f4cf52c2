//! Configuration loading and management.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Engine configuration.
///
/// Every field defaults to the production constants, so an empty TOML
/// document (or `EngineConfig::default()`) yields a fully working engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Detection thresholds and signal tuning.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Reputation score lifetimes.
    #[serde(default)]
    pub reputation: ReputationConfig,
    /// Optional SQLite persistence for reputation and activity records.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or ":memory:" for tests.
    pub path: String,
}

/// Fraud detection thresholds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum clicks per user per hour.
    pub max_clicks_per_user_hour: u64,
    /// Maximum clicks per IP per hour.
    pub max_clicks_per_ip_hour: u64,
    /// Maximum clicks per device (or device fingerprint) per hour.
    pub max_clicks_per_device_hour: u64,
    /// Maximum clicks per ad per user per day.
    pub max_clicks_per_ad_user_day: u64,
    /// Minimum time between clicks in milliseconds.
    pub min_click_interval_ms: i64,
    /// Click-through rate (%) above which engagement is suspicious.
    pub suspicious_ctr_pct: f64,
    /// Overall score at or above which a click is fraudulent.
    pub fraud_score_threshold: u8,
    /// Lookback window for click-pattern regularity analysis.
    pub pattern_window_ms: i64,
    /// Minimum recent clicks before the pattern check has evidence.
    pub pattern_min_samples: usize,
    /// Inter-click standard deviation (ms) below which timing is bot-like.
    pub pattern_max_std_dev_ms: f64,
    /// Mean inter-click interval (ms) below which timing is bot-like.
    pub pattern_max_mean_ms: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_clicks_per_user_hour: 10,
            max_clicks_per_ip_hour: 20,
            max_clicks_per_device_hour: 15,
            max_clicks_per_ad_user_day: 5,
            min_click_interval_ms: 500,
            suspicious_ctr_pct: 20.0,
            fraud_score_threshold: 70,
            pattern_window_ms: 10 * 60 * 1000,
            pattern_min_samples: 3,
            pattern_max_std_dev_ms: 200.0,
            pattern_max_mean_ms: 2000.0,
        }
    }
}

/// Reputation TTLs per entity kind, in seconds.
///
/// Reputation only heals via expiry, so these lifetimes are the penalty
/// windows: sustained good behavior must outlast them.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub user_ttl_secs: u64,
    pub device_ttl_secs: u64,
    pub ip_ttl_secs: u64,
    pub device_fingerprint_ttl_secs: u64,
    pub ip_fingerprint_ttl_secs: u64,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        const DAY: u64 = 24 * 60 * 60;
        Self {
            user_ttl_secs: 30 * DAY,
            device_ttl_secs: 30 * DAY,
            ip_ttl_secs: 7 * DAY,
            device_fingerprint_ttl_secs: 30 * DAY,
            ip_fingerprint_ttl_secs: 7 * DAY,
        }
    }
}

impl ReputationConfig {
    /// TTL for the given entity kind.
    pub fn ttl(&self, kind: crate::store::EntityKind) -> Duration {
        use crate::store::EntityKind;
        let secs = match kind {
            EntityKind::User => self.user_ttl_secs,
            EntityKind::Device => self.device_ttl_secs,
            EntityKind::Ip => self.ip_ttl_secs,
            EntityKind::DeviceFingerprint => self.device_fingerprint_ttl_secs,
            EntityKind::IpFingerprint => self.ip_fingerprint_ttl_secs,
        };
        Duration::from_secs(secs)
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

//! Prometheus metrics for clickshield.
//!
//! Tracks click throughput, fraud verdicts, flagged network sources,
//! suspicious activity volume, signal degradation, and detection latency.
//! The host process scrapes these through its own metrics endpoint via
//! [`gather_metrics`].

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Total clicks run through the pipeline.
pub static CLICKS_PROCESSED: OnceLock<IntCounter> = OnceLock::new();

/// Total clicks denied as fraudulent.
pub static CLICKS_BLOCKED: OnceLock<IntCounter> = OnceLock::new();

/// Fraudulent clicks by network flag (proxy/vpn/datacenter).
pub static FLAGGED_NETWORK: OnceLock<IntCounterVec> = OnceLock::new();

/// Suspicious activity records by kind and severity.
pub static ACTIVITY_RECORDED: OnceLock<IntCounterVec> = OnceLock::new();

/// Signal checks degraded to neutral, by signal and error code.
pub static SIGNAL_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Reputation raises by entity kind.
pub static REPUTATION_RAISED: OnceLock<IntCounterVec> = OnceLock::new();

/// Distribution of overall fraud scores.
pub static FRAUD_SCORE: OnceLock<Histogram> = OnceLock::new();

/// Detection latency per click.
pub static DETECT_LATENCY: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at host startup before any metrics are recorded.
pub fn init() {
    let r = registry();

    // Helper macro to register metric
    macro_rules! register {
        ($metric:ident, $init:expr) => {
            let m = $init.expect(concat!(stringify!($metric), " creation failed"));
            if let Err(e) = r.register(Box::new(m.clone())) {
                tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
            }
            let _ = $metric.set(m);
        };
    }

    register!(CLICKS_PROCESSED, IntCounter::new("adfraud_clicks_processed_total", "Clicks run through the pipeline"));
    register!(CLICKS_BLOCKED, IntCounter::new("adfraud_clicks_blocked_total", "Clicks denied as fraudulent"));
    register!(FLAGGED_NETWORK, IntCounterVec::new(Opts::new("adfraud_flagged_network_total", "Fraudulent clicks by network flag"), &["network"]));
    register!(ACTIVITY_RECORDED, IntCounterVec::new(Opts::new("adfraud_suspicious_activity_total", "Suspicious activity records"), &["kind", "severity"]));
    register!(SIGNAL_ERRORS, IntCounterVec::new(Opts::new("adfraud_signal_errors_total", "Signal checks degraded to neutral"), &["signal", "error"]));
    register!(REPUTATION_RAISED, IntCounterVec::new(Opts::new("adfraud_reputation_raised_total", "Reputation raises by entity kind"), &["entity"]));
    register!(FRAUD_SCORE, Histogram::with_opts(
        HistogramOpts::new("adfraud_score", "Overall fraud score distribution")
            .buckets(vec![10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0])));
    register!(DETECT_LATENCY, Histogram::with_opts(
        HistogramOpts::new("adfraud_detect_duration_seconds", "Fraud detection latency per click")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

pub fn record_click_processed() {
    if let Some(c) = CLICKS_PROCESSED.get() {
        c.inc();
    }
}

pub fn record_click_blocked() {
    if let Some(c) = CLICKS_BLOCKED.get() {
        c.inc();
    }
}

pub fn record_flagged_network(network: &str) {
    if let Some(c) = FLAGGED_NETWORK.get() {
        c.with_label_values(&[network]).inc();
    }
}

pub fn record_activity(kind: &str, severity: &str) {
    if let Some(c) = ACTIVITY_RECORDED.get() {
        c.with_label_values(&[kind, severity]).inc();
    }
}

pub fn record_signal_error(signal: &str, error: &str) {
    if let Some(c) = SIGNAL_ERRORS.get() {
        c.with_label_values(&[signal, error]).inc();
    }
}

pub fn record_reputation_raised(entity: &str) {
    if let Some(c) = REPUTATION_RAISED.get() {
        c.with_label_values(&[entity]).inc();
    }
}

pub fn record_fraud_score(score: u8) {
    if let Some(h) = FRAUD_SCORE.get() {
        h.observe(score as f64);
    }
}

pub fn record_detect_latency(seconds: f64) {
    if let Some(h) = DETECT_LATENCY.get() {
        h.observe(seconds);
    }
}

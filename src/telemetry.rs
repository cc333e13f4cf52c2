//! Telemetry utilities: tracing setup, spans, and latency timing.

use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Install a formatted tracing subscriber with `RUST_LOG`-style filtering.
///
/// Call once from the host process; the engine itself only emits events.
/// Safe to skip entirely if the host installs its own subscriber.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();
}

/// Guard for timing one detection pass.
///
/// Records detection latency when dropped, so early returns (missing
/// data, fail-open) are timed the same as full passes.
pub struct DetectTimer {
    start: Instant,
}

impl DetectTimer {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for DetectTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DetectTimer {
    fn drop(&mut self) {
        crate::metrics::record_detect_latency(self.start.elapsed().as_secs_f64());
    }
}

/// Standardized span constructors for click-path observability.
pub mod spans {
    use tracing::{Span, info_span};

    /// Create a span for one click processing pass.
    pub fn click(user_id: &str, ad_id: &str) -> Span {
        info_span!("click", user = %user_id, ad = %ad_id)
    }

    /// Create a span for one suspicious-activity tracking pass.
    pub fn activity(kind: &str, severity: &str) -> Span {
        info_span!("activity", kind = %kind, severity = %severity)
    }
}

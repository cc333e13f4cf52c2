//! clickshield - real-time click fraud detection and reputation scoring.
//!
//! The engine decides, before a reported ad click is accepted, whether it
//! should be trusted, and maintains longer-lived reputation signals about
//! the users, devices, and addresses generating traffic.
//!
//! # Architecture
//!
//! ```text
//! raw click -> enrichment -> 6 concurrent signal checks -> combiner
//!                                                             |
//!                 reputation store <- activity tracker <- verdict
//! ```
//!
//! - **Signal checks** (frequency, interval, pattern, device, ip, ctr)
//!   each produce a normalized (score, weight, reason) and are
//!   individually fail-soft.
//! - **Windowed counters** back the rate signals: TTL-bounded, atomic,
//!   scoped to one hour/day bucket.
//! - **Reputation** is monotonically raised per entity and heals only by
//!   TTL expiry.
//! - The **pipeline** never fails: malformed input scores maximal,
//!   infrastructure faults fail open.
//!
//! # Quick start
//!
//! ```no_run
//! use clickshield::{ClickEvent, ClickPipeline, EngineConfig};
//!
//! # async fn run() {
//! let pipeline = ClickPipeline::in_memory(EngineConfig::default());
//! let click = ClickEvent::new("user-1", "device-1", "203.0.113.7", "ad-42", 1_700_000_000_000);
//! let decision = pipeline.process(click).await;
//! if !decision.allowed {
//!     println!("blocked: {:?}", decision.fraud.reasons);
//! }
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod detect;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;
pub mod providers;
pub mod signals;
pub mod store;
pub mod telemetry;

pub use activity::{
    ActivityKind, ActivityRecord, ActivitySink, ActivityTracker, MemoryActivitySink, Severity,
    TrackOutcome, TrafficAnalysis,
};
pub use config::{ConfigError, DatabaseConfig, EngineConfig, ReputationConfig, Thresholds};
pub use detect::{FraudDetector, FraudResult};
pub use error::{EngineError, StoreError};
pub use event::{ClickEvent, Enrichment, IpInfo};
pub use pipeline::{ClickDecision, ClickPipeline, TrafficStats};
pub use providers::{
    ClickHistory, ContextEnricher, EngagementStats, MemoryClickHistory, MemoryEngagementStats,
    NoopEnricher,
};
pub use signals::{SignalKind, SignalResult};
pub use store::{
    CounterKey, CounterStore, Database, EntityKind, MemoryCounterStore, MemoryReputationStore,
    ReputationStore, SqliteActivitySink, SqliteReputationStore, Window,
};

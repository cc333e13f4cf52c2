//! Shared state stores.
//!
//! The counter store and the reputation store are the only mutable shared
//! state in the engine. Both are injected as trait objects so tests run
//! against the in-memory maps and production can point at SQLite (or any
//! other backend a host implements).

pub mod counter;
pub mod reputation;
pub mod sqlite;

pub use counter::{CounterKey, CounterStore, MemoryCounterStore, Window};
pub use reputation::{EntityKind, MemoryReputationStore, ReputationStore};
pub use sqlite::{Database, SqliteActivitySink, SqliteReputationStore};

pub use crate::error::StoreError;

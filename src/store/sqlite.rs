//! SQLite-backed persistence for reputation scores and activity records.
//!
//! The reputation upsert pushes the `max(existing, candidate)` semantics
//! into SQL, so concurrent raises through separate connections still
//! resolve to the maximum. Expiry is lazy: reads filter on `expires_at`
//! and `purge_expired` reclaims rows from a maintenance task.

use async_trait::async_trait;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

use crate::activity::{ActivityKind, ActivityRecord, ActivitySink, Severity};
use crate::config::ReputationConfig;
use crate::error::StoreError;
use crate::store::reputation::{EntityKind, ReputationStore};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database handle with connection pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connection acquire timeout - prevents connection storms from blocking indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new database connection, creating the schema if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:clickshield-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Database connected");

        // WAL mode allows reads to happen while writes are in progress.
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        Self::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    /// Get reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Durable reputation store over this database.
    pub fn reputation(&self, ttls: ReputationConfig) -> SqliteReputationStore {
        SqliteReputationStore { pool: self.pool.clone(), ttls }
    }

    /// Durable activity sink over this database.
    pub fn activity_sink(&self) -> SqliteActivitySink {
        SqliteActivitySink { pool: self.pool.clone() }
    }

    async fn init_schema(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reputation (
                kind       TEXT NOT NULL,
                entity     TEXT NOT NULL,
                score      INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (kind, entity)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS suspicious_activity (
                id          TEXT PRIMARY KEY,
                kind        TEXT NOT NULL,
                severity    TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                device_id   TEXT NOT NULL,
                ip          TEXT NOT NULL,
                ad_id       TEXT NOT NULL,
                score       INTEGER NOT NULL,
                reasons     TEXT NOT NULL,
                details     TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activity_user ON suspicious_activity(user_id, recorded_at)",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activity_ip ON suspicious_activity(ip, recorded_at)",
        )
        .execute(pool)
        .await?;

        info!("Database schema checked/applied");
        Ok(())
    }
}

/// Reputation store persisted in SQLite.
#[derive(Clone)]
pub struct SqliteReputationStore {
    pool: SqlitePool,
    ttls: ReputationConfig,
}

impl SqliteReputationStore {
    /// Delete expired rows. Reads already filter on `expires_at`, so this
    /// only reclaims space.
    pub async fn purge_expired(&self) -> Result<u64, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let result = sqlx::query("DELETE FROM reputation WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ReputationStore for SqliteReputationStore {
    async fn score(&self, kind: EntityKind, id: &str) -> Result<u8, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let score = sqlx::query_scalar::<_, i64>(
            "SELECT score FROM reputation WHERE kind = ? AND entity = ? AND expires_at > ?",
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(score.unwrap_or(0).clamp(0, 100) as u8)
    }

    async fn raise(&self, kind: EntityKind, id: &str, candidate: u8) -> Result<u8, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let expires_at = now + self.ttls.ttl(kind).as_millis() as i64;
        let candidate = candidate.min(100) as i64;

        // MAX() on the conflict branch keeps the raise atomic inside SQLite,
        // even with concurrent writers on separate connections. An expired
        // row no longer counts as prior reputation.
        let stored = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO reputation (kind, entity, score, updated_at, expires_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(kind, entity) DO UPDATE SET
                score = CASE
                    WHEN reputation.expires_at <= excluded.updated_at THEN excluded.score
                    ELSE MAX(reputation.score, excluded.score)
                END,
                updated_at = excluded.updated_at,
                expires_at = excluded.expires_at
            RETURNING score
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(candidate)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(stored.clamp(0, 100) as u8)
    }
}

/// Activity sink persisted in SQLite.
#[derive(Clone)]
pub struct SqliteActivitySink {
    pool: SqlitePool,
}

type ActivityRow = (
    String,
    String,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    String,
    i64,
);

impl SqliteActivitySink {
    /// Most recent activity records, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<ActivityRecord>, StoreError> {
        let rows = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT id, kind, severity, user_id, device_id, ip, ad_id, score,
                   reasons, details, recorded_at
            FROM suspicious_activity
            ORDER BY recorded_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().filter_map(Self::from_row).collect())
    }

    /// Activity records for one user, device, or IP, newest first.
    pub async fn for_entity(
        &self,
        kind: EntityKind,
        id: &str,
        limit: u32,
    ) -> Result<Vec<ActivityRecord>, StoreError> {
        let column = match kind {
            EntityKind::User => "user_id",
            EntityKind::Device => "device_id",
            EntityKind::Ip => "ip",
            // Fingerprints are not indexed columns; they live in details.
            EntityKind::DeviceFingerprint | EntityKind::IpFingerprint => {
                return Ok(Vec::new());
            }
        };

        let sql = format!(
            "SELECT id, kind, severity, user_id, device_id, ip, ad_id, score, \
             reasons, details, recorded_at \
             FROM suspicious_activity WHERE {column} = ? \
             ORDER BY recorded_at DESC LIMIT ?"
        );

        let rows = sqlx::query_as::<_, ActivityRow>(&sql)
            .bind(id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().filter_map(Self::from_row).collect())
    }

    fn from_row(row: ActivityRow) -> Option<ActivityRecord> {
        let (id, kind, severity, user_id, device_id, ip, ad_id, score, reasons, details, at) = row;
        Some(ActivityRecord {
            id: id.parse().ok()?,
            kind: ActivityKind::parse(&kind)?,
            severity: Severity::parse(&severity)?,
            user_id,
            device_id,
            ip,
            ad_id,
            score: score.clamp(0, 100) as u8,
            reasons: serde_json::from_str(&reasons).unwrap_or_default(),
            details: serde_json::from_str(&details).unwrap_or(serde_json::Value::Null),
            recorded_at: chrono::DateTime::from_timestamp_millis(at)?,
        })
    }
}

#[async_trait]
impl ActivitySink for SqliteActivitySink {
    async fn save(&self, record: &ActivityRecord) -> Result<(), StoreError> {
        let reasons = serde_json::to_string(&record.reasons)
            .unwrap_or_else(|_| "[]".to_string());
        let details = serde_json::to_string(&record.details)
            .unwrap_or_else(|_| "null".to_string());

        sqlx::query(
            r#"
            INSERT INTO suspicious_activity
                (id, kind, severity, user_id, device_id, ip, ad_id, score,
                 reasons, details, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.kind.as_str())
        .bind(record.severity.as_str())
        .bind(&record.user_id)
        .bind(&record.device_id)
        .bind(&record.ip)
        .bind(&record.ad_id)
        .bind(record.score as i64)
        .bind(reasons)
        .bind(details)
        .bind(record.recorded_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

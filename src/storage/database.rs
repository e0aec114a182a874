//! SQLite database layer for timeseries data
//!
//! This module provides async database operations with:
//! - Connection pooling (WAL mode, readers never block on the writer)
//! - A single-writer lock serializing migrations, registrations and batches
//! - All-or-nothing batch appends

use super::migrations::{self, Migration, MigrationReport};
use super::registry::{find_or_create, MetricRegistry};
use super::{to_millis, Metric};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Values of one sample window, keyed by metric name
pub type Batch = BTreeMap<String, (super::MetricKind, i64)>;

/// Timeseries database handle
///
/// Owns the connection pool, the writer lock and the identifier cache.
#[derive(Debug)]
pub struct StatsDb {
    pool: SqlitePool,
    writer: Mutex<()>,
    registry: MetricRegistry,
}

impl StatsDb {
    /// Open (creating if necessary) the database at `database_url`
    ///
    /// Does not run migrations; see [`StatsDb::migrate`].
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = StatsDb::connect("sqlite:./stats.sqlite3", 5).await?;
    /// ```
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        Self::connect_with(database_url, max_connections, true).await
    }

    /// Open an existing database; a missing file is an error
    pub async fn open_existing(database_url: &str, max_connections: u32) -> Result<Self> {
        Self::connect_with(database_url, max_connections, false).await
    }

    async fn connect_with(
        database_url: &str,
        max_connections: u32,
        create_if_missing: bool,
    ) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(create_if_missing)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .foreign_keys(true)
            .pragma("synchronous", "NORMAL");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::debug!(url = %database_url, "Connected to stats database");

        Ok(Self {
            pool,
            writer: Mutex::new(()),
            registry: MetricRegistry::new(),
        })
    }

    /// Bring the schema up to date
    pub async fn migrate(&self, migrations: &[Migration]) -> Result<MigrationReport> {
        let _writer = self.write_lock().await;
        migrations::apply(&self.pool, migrations).await
    }

    /// Persisted schema version
    pub async fn schema_version(&self) -> Result<i64> {
        migrations::stored_version(&self.pool).await
    }

    /// Commit one sample window
    ///
    /// Every entry is resolved (registering unknown metrics) and written with
    /// the shared `timestamp` inside a single transaction. On failure nothing
    /// is committed and the identifier cache is left untouched.
    pub async fn append_batch(&self, timestamp: DateTime<Utc>, batch: &Batch) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let ts = to_millis(&timestamp);
        let _writer = self.write_lock().await;

        let mut tx = self.pool.begin().await?;
        let mut registered: Vec<Metric> = Vec::new();

        for (name, (kind, value)) in batch {
            let id = match self.registry.cached(name) {
                Some(metric) => metric.id,
                None => {
                    let (metric, _) = find_or_create(&mut tx, name, *kind).await?;
                    let id = metric.id;
                    registered.push(metric);
                    id
                }
            };

            sqlx::query("INSERT INTO data (ts, tsi, value) VALUES (?, ?, ?)")
                .bind(ts)
                .bind(id)
                .bind(*value)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        for metric in registered {
            self.registry.publish(metric);
        }

        Ok(batch.len())
    }

    /// Get database statistics
    pub async fn stats(&self) -> Result<DatabaseStats> {
        let schema_version = self.schema_version().await?;

        let series_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM timeseries")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);

        let data_point_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data")
            .fetch_one(&self.pool)
            .await
            .unwrap_or(0);

        Ok(DatabaseStats {
            schema_version,
            series_count: series_count as u64,
            data_point_count: data_point_count as u64,
        })
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Stats database closed");
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub(crate) async fn write_lock(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().await
    }
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub schema_version: i64,
    pub series_count: u64,
    pub data_point_count: u64,
}

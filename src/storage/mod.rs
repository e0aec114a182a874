//! Persistent storage for getstats
//!
//! This module provides the SQLite side of the engine:
//! - **Migrations**: ordered, versioned schema changes
//! - **Registry**: metric name → identifier, cached in memory
//! - **Database**: batch appends under a single-writer lock
//! - **Query**: inclusive time-range reads and series discovery
//!
//! ## Schema
//!
//! ```text
//! timeseries(id, name UNIQUE, kind)
//!     ↑
//! data(ts, tsi → timeseries.id, value)   indexed by tsi, ts, (tsi, ts)
//!
//! migrations(sequence_id, applied_at)
//! ```
//!
//! Timestamps are stored as UTC Unix milliseconds.

pub mod database;
pub mod migrations;
pub mod query;
pub mod registry;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

pub use database::{DatabaseStats, StatsDb};
pub use migrations::{default_migrations, Migration, MigrationArg, MigrationReport};
pub use registry::MetricRegistry;

/// Aggregation semantics of a metric within one sample window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricKind {
    /// Last value set wins
    Gauge,
    /// Increments are summed
    Counter,
}

impl MetricKind {
    /// Code persisted in `timeseries.kind`
    pub fn code(self) -> i64 {
        match self {
            Self::Gauge => 1,
            Self::Counter => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Gauge),
            2 => Some(Self::Counter),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "GAUGE",
            Self::Counter => "COUNTER",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable numeric handle of a metric
pub type MetricId = i64;

/// A registered timeseries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub id: MetricId,
    pub name: String,
    pub kind: MetricKind,
}

/// A single stored observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: DateTime<Utc>,
    pub value: i64,
}

/// Current time as Unix milliseconds
pub fn current_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub(crate) fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Parse a user-supplied time bound
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00Z`), a naive date-time taken as UTC
/// (`2024-05-01T12:00:00`, `2024-05-01 12:00:00`), or a bare date.
pub fn parse_timestamp(input: &str) -> crate::error::Result<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(naive) = NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(naive.and_utc());
    }

    Err(crate::error::StatsError::InvalidTimestamp(input.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::StatsDb;
    use tempfile::TempDir;

    /// File-backed database in a temp dir; keep the guard alive for the test
    pub async fn temp_db() -> (StatsDb, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("stats.sqlite3").display());
        let db = StatsDb::connect(&url, 4).await.unwrap();
        (db, dir)
    }

    pub async fn migrated_db() -> (StatsDb, TempDir) {
        let (db, dir) = temp_db().await;
        db.migrate(&super::default_migrations()).await.unwrap();
        (db, dir)
    }
}

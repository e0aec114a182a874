//! Metric registry: name → identifier resolution
//!
//! Identifiers are assigned by SQLite and never change, so the in-memory cache
//! is append-only and never invalidated. Creation runs under the storage
//! writer lock and uses `INSERT OR IGNORE` against the unique name, so two
//! concurrent creators of the same metric end up with the same identifier
//! (first writer wins).

use super::{Metric, MetricId, MetricKind, StatsDb};
use crate::error::{Result, StatsError};
use dashmap::DashMap;
use sqlx::SqliteConnection;

/// In-memory identifier cache
#[derive(Debug, Default)]
pub struct MetricRegistry {
    cache: DashMap<String, Metric>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached(&self, name: &str) -> Option<Metric> {
        self.cache.get(name).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Only call once the row backing `metric` is committed.
    pub(crate) fn publish(&self, metric: Metric) {
        self.cache.entry(metric.name.clone()).or_insert(metric);
    }
}

fn decode_kind(code: i64) -> Result<MetricKind> {
    MetricKind::from_code(code).ok_or_else(|| {
        StatsError::Database(sqlx::Error::Decode(
            format!("unknown timeseries kind {}", code).into(),
        ))
    })
}

/// Look a metric up by name on the given connection
pub(crate) async fn find(conn: &mut SqliteConnection, name: &str) -> Result<Option<Metric>> {
    let row: Option<(i64, i64)> = sqlx::query_as("SELECT id, kind FROM timeseries WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?;

    match row {
        Some((id, code)) => Ok(Some(Metric {
            id,
            name: name.to_string(),
            kind: decode_kind(code)?,
        })),
        None => Ok(None),
    }
}

/// Get-or-create on the given connection (normally inside a transaction)
///
/// Returns the metric and whether this call inserted it.
pub(crate) async fn find_or_create(
    conn: &mut SqliteConnection,
    name: &str,
    kind: MetricKind,
) -> Result<(Metric, bool)> {
    let inserted = sqlx::query("INSERT OR IGNORE INTO timeseries (name, kind) VALUES (?, ?)")
        .bind(name)
        .bind(kind.code())
        .execute(&mut *conn)
        .await?
        .rows_affected()
        > 0;

    let metric = find(conn, name)
        .await?
        .ok_or(StatsError::Database(sqlx::Error::RowNotFound))?;

    if metric.kind != kind {
        tracing::warn!(
            metric = %name,
            stored = %metric.kind,
            requested = %kind,
            "Timeseries already registered with a different kind; keeping stored kind"
        );
    }

    Ok((metric, inserted))
}

impl StatsDb {
    /// Resolve a metric name to its identifier
    ///
    /// Cache hits never touch storage. With `create_if_missing` an unknown name
    /// is registered with `kind`; otherwise it fails with `UnknownMetric`.
    pub async fn resolve(
        &self,
        name: &str,
        kind: MetricKind,
        create_if_missing: bool,
    ) -> Result<MetricId> {
        if let Some(metric) = self.registry().cached(name) {
            return Ok(metric.id);
        }

        if !create_if_missing {
            return self.lookup(name).await.map(|metric| metric.id);
        }

        let _writer = self.write_lock().await;

        let mut tx = self.pool().begin().await?;
        let (metric, inserted) = find_or_create(&mut tx, name, kind).await?;
        tx.commit().await?;

        if inserted {
            tracing::debug!(metric = %name, id = metric.id, kind = %metric.kind, "Registered timeseries");
        }

        let id = metric.id;
        self.registry().publish(metric);
        Ok(id)
    }

    /// Resolve an existing metric without creating it
    pub async fn lookup(&self, name: &str) -> Result<Metric> {
        if let Some(metric) = self.registry().cached(name) {
            return Ok(metric);
        }

        let mut conn = self.pool().acquire().await?;
        let metric = find(&mut conn, name)
            .await?
            .ok_or_else(|| StatsError::UnknownMetric(name.to_string()))?;

        self.registry().publish(metric.clone());
        Ok(metric)
    }
}

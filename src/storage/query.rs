//! Query API for timeseries data
//!
//! Reads go straight to the pool without the writer lock. WAL isolation means
//! a reader sees either all of a batch or none of it.

use super::{current_millis, from_millis, to_millis, DataPoint, Metric, MetricKind, StatsDb};
use crate::error::{Result, StatsError};
use chrono::{DateTime, Utc};

impl StatsDb {
    /// Data points of `name` with `from <= timestamp <= to`, oldest first
    ///
    /// `from` defaults to the Unix epoch and `to` to the current time. Unknown
    /// names fail with `UnknownMetric`; nothing is registered.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let last_day = db.range("getinfo_num_peers", Some(Utc::now() - Duration::days(1)), None).await?;
    /// ```
    pub async fn range(
        &self,
        name: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>> {
        let metric = self.lookup(name).await?;
        self.range_for(&metric, from, to).await
    }

    pub(crate) async fn range_for(
        &self,
        metric: &Metric,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Vec<DataPoint>> {
        let from = from.as_ref().map(to_millis).unwrap_or(0);
        let to = to.as_ref().map(to_millis).unwrap_or_else(current_millis);

        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT ts, value FROM data
             WHERE tsi = ? AND ts >= ? AND ts <= ?
             ORDER BY ts ASC",
        )
        .bind(metric.id)
        .bind(from)
        .bind(to)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|(ts, value)| DataPoint {
                timestamp: from_millis(ts),
                value,
            })
            .collect())
    }

    /// All registered timeseries, in registration order
    pub async fn list_series(&self) -> Result<Vec<Metric>> {
        let rows: Vec<(i64, String, i64)> =
            sqlx::query_as("SELECT id, name, kind FROM timeseries ORDER BY id ASC")
                .fetch_all(self.pool())
                .await?;

        rows.into_iter()
            .map(|(id, name, code)| {
                let kind = MetricKind::from_code(code).ok_or_else(|| {
                    StatsError::Database(sqlx::Error::Decode(
                        format!("unknown timeseries kind {} for {}", code, name).into(),
                    ))
                })?;
                Ok(Metric { id, name, kind })
            })
            .collect()
    }

    /// Load every stored series into the identifier cache
    pub async fn warm_registry(&self) -> Result<usize> {
        let metrics = self.list_series().await?;
        let count = metrics.len();
        for metric in metrics {
            self.registry().publish(metric);
        }
        Ok(count)
    }
}

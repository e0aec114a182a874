//! Engine handle
//!
//! `StatsEngine` is the context object every entry point goes through. Its
//! lifecycle is `connect` → `initialize` (migrations, then ready) → serving →
//! `close`. Until `initialize` succeeds the query entry points fail with
//! `NotReady` and event intake is dropped.

use crate::error::{Result, StatsError};
use crate::sample::SampleAccumulator;
use crate::source::Observation;
use crate::storage::{DataPoint, Metric, MetricKind, Migration, MigrationReport, StatsDb};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::watch;

/// Points of one timeseries together with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Series {
    pub metric: Metric,
    pub points: Vec<DataPoint>,
}

pub struct StatsEngine {
    db: StatsDb,
    samples: SampleAccumulator,
    ready: watch::Sender<bool>,
    /// Event names accepted by `record_event`; `None` accepts any
    allowed_events: Option<HashSet<String>>,
}

impl StatsEngine {
    pub fn new(db: StatsDb) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            db,
            samples: SampleAccumulator::new(),
            ready,
            allowed_events: None,
        }
    }

    /// Only record events whose name is in `names`
    pub fn with_allowed_events<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_events = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Open the database; the engine is not ready until [`initialize`](Self::initialize)
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = StatsDb::connect(database_url, max_connections).await?;
        Ok(Self::new(db))
    }

    /// Run migrations and mark the engine ready
    pub async fn initialize(&self, migrations: &[Migration]) -> Result<MigrationReport> {
        let report = self.db.migrate(migrations).await?;
        let known = self.db.warm_registry().await?;
        self.ready.send_replace(true);
        tracing::debug!(series = known, "Metric registry loaded");
        tracing::info!(schema_version = report.to, "Stats engine ready");
        Ok(report)
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the engine is ready
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        // The sender lives as long as self, so this cannot observe a close
        let _ = rx.wait_for(|ready| *ready).await;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(StatsError::NotReady)
        }
    }

    /// Stored points of `name` between the inclusive bounds
    pub async fn get_series(
        &self,
        name: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<Series> {
        self.ensure_ready()?;
        let metric = self.db.lookup(name).await?;
        let points = self.db.range_for(&metric, from, to).await?;
        Ok(Series { metric, points })
    }

    /// Every known timeseries
    pub async fn list_series(&self) -> Result<Vec<Metric>> {
        self.ensure_ready()?;
        self.db.list_series().await
    }

    /// Count an event in the open window
    ///
    /// Returns whether the event was counted. It is dropped while the engine
    /// is not ready, when the increment is not positive, when the name is not
    /// an allowed event, and when the name belongs to a gauge.
    pub fn record_event(&self, name: &str, value: Option<i64>) -> bool {
        if !self.is_ready() {
            tracing::trace!(event = %name, "Engine not ready, dropping event");
            return false;
        }

        let value = value.unwrap_or(1);
        if value <= 0 {
            tracing::warn!(event = %name, value, "Dropping event with non-positive increment");
            return false;
        }

        if let Some(allowed) = &self.allowed_events {
            if !allowed.contains(name) {
                tracing::debug!(event = %name, "Dropping event not in the allowed list");
                return false;
            }
        }

        let stored_gauge = self
            .db
            .registry()
            .cached(name)
            .is_some_and(|metric| metric.kind == MetricKind::Gauge);
        if stored_gauge || self.samples.kind_of(name) == Some(MetricKind::Gauge) {
            tracing::warn!(event = %name, "Dropping event aimed at a gauge timeseries");
            return false;
        }

        if !self.samples.accumulate(name, MetricKind::Counter, value) {
            return false;
        }
        crate::metrics::record_event(name);
        true
    }

    /// Feed an observation from a snapshot source into the open window
    pub fn observe(&self, observation: &Observation) {
        self.samples
            .accumulate(&observation.name, observation.kind, observation.value);
    }

    /// Commit the open window with `timestamp` and reset it
    ///
    /// The buffer is only reset when the batch commits; on failure the window
    /// stays open and pending counter increments carry into the next flush.
    pub async fn flush(&self, timestamp: DateTime<Utc>) -> Result<usize> {
        let drained = self.samples.drain();
        if drained.is_empty() {
            return Ok(0);
        }

        let written = self.db.append_batch(timestamp, drained.batch()).await?;
        self.samples.settle(&drained);

        tracing::debug!(points = written, timestamp = %timestamp, "Flushed sample window");
        Ok(written)
    }

    /// Release the storage handle; the engine stops serving
    pub async fn close(&self) {
        self.ready.send_replace(false);
        self.db.close().await;
    }

    pub fn db(&self) -> &StatsDb {
        &self.db
    }

    pub fn samples(&self) -> &SampleAccumulator {
        &self.samples
    }
}

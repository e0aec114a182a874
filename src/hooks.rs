//! Host capability interface
//!
//! The host (HTTP API, plugin bridge, tests) drives the engine only through
//! `HostHooks`: events as they happen, and a periodic tick that closes the
//! current sample window.

use crate::engine::StatsEngine;
use crate::error::{Result, StatsError};
use crate::source::SnapshotSource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of one collect-and-flush cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub observed: usize,
    pub written: usize,
}

#[async_trait]
pub trait HostHooks: Send + Sync {
    /// An event occurred; fire-and-forget
    fn on_event(&self, name: &str);

    /// Collect a snapshot and flush the open window
    async fn on_periodic_tick(&self) -> Result<CycleReport>;
}

/// Binds the engine to its snapshot source
pub struct Collector {
    engine: Arc<StatsEngine>,
    source: Arc<dyn SnapshotSource>,
}

impl Collector {
    pub fn new(engine: Arc<StatsEngine>, source: Arc<dyn SnapshotSource>) -> Self {
        Self { engine, source }
    }

    pub fn engine(&self) -> &Arc<StatsEngine> {
        &self.engine
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let timestamp = Utc::now();

        let observations = self.source.fetch().await.map_err(|e| {
            StatsError::CollectionFailure(format!("{}: {}", self.source.name(), e))
        })?;

        for observation in &observations {
            self.engine.observe(observation);
        }

        let written = self
            .engine
            .flush(timestamp)
            .await
            .map_err(|e| StatsError::CollectionFailure(format!("flush: {}", e)))?;

        Ok(CycleReport {
            timestamp,
            observed: observations.len(),
            written,
        })
    }
}

#[async_trait]
impl HostHooks for Collector {
    fn on_event(&self, name: &str) {
        self.engine.record_event(name, None);
    }

    async fn on_periodic_tick(&self) -> Result<CycleReport> {
        tracing::info!(source = %self.source.name(), "Collecting stats");
        let start = Instant::now();

        let result = self.run_cycle().await;
        crate::metrics::record_cycle(result.is_ok(), start.elapsed());

        if let Ok(report) = &result {
            crate::metrics::record_points_written(report.written as u64);
        }
        result
    }
}

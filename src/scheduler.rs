//! Background collection task
//!
//! Waits for the engine to become ready, runs one cycle straight away so the
//! first data point does not wait a full interval, then ticks at a fixed
//! interval for the lifetime of the process. A failed cycle is logged and the
//! next tick still fires.

use crate::engine::StatsEngine;
use crate::hooks::HostHooks;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Scheduler configuration
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Length of one sample window
    pub interval: Duration,

    /// Run a cycle as soon as the engine is ready
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15 * 60),
            run_on_start: true,
        }
    }
}

/// Spawn the collection task
///
/// # Example
///
/// ```ignore
/// let collector = Arc::new(Collector::new(engine.clone(), source));
/// let handle = spawn_scheduler(engine, collector, SchedulerConfig::default());
/// ```
pub fn spawn_scheduler(
    engine: Arc<StatsEngine>,
    hooks: Arc<dyn HostHooks>,
    config: SchedulerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        scheduler_loop(engine, hooks, config).await;
    })
}

async fn scheduler_loop(engine: Arc<StatsEngine>, hooks: Arc<dyn HostHooks>, config: SchedulerConfig) {
    engine.wait_ready().await;

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        run_on_start = config.run_on_start,
        "Stats scheduler started"
    );

    let mut ticker = time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // The first tick of an interval completes immediately
    if !config.run_on_start {
        ticker.tick().await;
    }

    loop {
        ticker.tick().await;
        run_tick(hooks.as_ref()).await;
    }
}

async fn run_tick(hooks: &dyn HostHooks) {
    match hooks.on_periodic_tick().await {
        Ok(report) => {
            tracing::info!(
                observed = report.observed,
                written = report.written,
                timestamp = %report.timestamp,
                "Stats sample stored"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Stats collection cycle failed");
        }
    }
}

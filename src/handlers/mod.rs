//! HTTP handlers
//!
//! The host surface of the engine: series queries, event intake, health and
//! Prometheus self metrics.

pub mod events;
pub mod health;
pub mod metrics_handler;
pub mod series;

use crate::engine::StatsEngine;
use crate::hooks::HostHooks;
use std::sync::Arc;
use std::time::Duration;

/// Shared state for the API handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<StatsEngine>,
    pub hooks: Arc<dyn HostHooks>,
    pub sample_interval: Duration,
}

pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod hooks;
pub mod metrics;
pub mod sample;
pub mod scheduler;
pub mod server;
pub mod signals;
pub mod source;
pub mod storage;

pub use engine::{Series, StatsEngine};
pub use error::{Result, StatsError};
pub use storage::{DataPoint, Metric, MetricKind, StatsDb};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over `level`. With `format == "json"` every
/// event is written as one JSON object per line.
///
/// Note: This function can only be called once per process.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

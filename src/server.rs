use anyhow::{Context, Result};
use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    engine::StatsEngine,
    error::StatsError,
    handlers::{self, AppState},
    hooks::{Collector, HostHooks},
    metrics,
    scheduler::spawn_scheduler,
    signals::{setup_signal_handlers, ShutdownSignal},
    source::{EventsOnlySource, NodeRestSource, SnapshotSource},
    storage::default_migrations,
};

/// Start the stats service
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the database and starts migrations in the background
/// 3. Spawns the collection scheduler (it waits for readiness itself)
/// 4. Serves the HTTP API until a shutdown signal arrives
/// 5. Stops the scheduler and closes the database
///
/// A migration failure shuts the server down and is returned as the error.
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let database_url = config.database.url();
    let engine = Arc::new(
        StatsEngine::connect(&database_url, config.database.max_connections)
            .await
            .with_context(|| format!("Failed to open database {}", config.database.path))?
            .with_allowed_events(config.events.allowed.iter().cloned()),
    );

    let source = build_source(&config)?;
    let hooks: Arc<dyn HostHooks> = Arc::new(Collector::new(engine.clone(), source));

    let init_handle = spawn_initialize(engine.clone(), shutdown_tx.clone());
    let scheduler_handle = spawn_scheduler(
        engine.clone(),
        hooks.clone(),
        config.scheduler.to_scheduler_config(),
    );

    let state = AppState {
        engine: engine.clone(),
        hooks,
        sample_interval: config.scheduler.interval(),
    };
    let app = create_router(state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting getstats on {}", addr);
    info!(
        "Configuration: database {}, collector {}, interval {}min",
        config.database.path,
        if config.collector.enabled {
            config.collector.base_url.as_str()
        } else {
            "disabled"
        },
        config.scheduler.interval_minutes
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    scheduler_handle.abort();
    signal_handle.abort();

    let init_result = if init_handle.is_finished() {
        init_handle.await?
    } else {
        init_handle.abort();
        Ok(())
    };

    engine.close().await;

    init_result.context("Database initialization failed")?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Snapshot source for the configured collector
fn build_source(config: &Config) -> Result<Arc<dyn SnapshotSource>> {
    if !config.collector.enabled {
        info!("Node collector disabled, only recorded events will be flushed");
        return Ok(Arc::new(EventsOnlySource));
    }

    let source = NodeRestSource::new(
        &config.collector.base_url,
        config.collector.rune.clone(),
        Duration::from_secs(config.collector.timeout_seconds),
    )
    .context("Failed to build node REST client")?;

    Ok(Arc::new(source))
}

/// Run migrations in the background; a failure triggers shutdown
fn spawn_initialize(
    engine: Arc<StatsEngine>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
) -> tokio::task::JoinHandle<std::result::Result<(), StatsError>> {
    tokio::spawn(async move {
        match engine.initialize(&default_migrations()).await {
            Ok(report) => {
                info!(
                    from = report.from,
                    to = report.to,
                    applied = report.applied(),
                    "Stats database ready"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Stats database initialization failed");
                let _ = shutdown_tx.send(ShutdownSignal::Graceful);
                Err(e)
            }
        }
    })
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    let query_routes = Router::new()
        .route("/api/v1/series", get(handlers::series::list_series))
        .route("/api/v1/series/:name", get(handlers::series::get_series))
        .layer(cors);

    let api_routes = Router::new()
        .merge(query_routes)
        .route("/api/v1/events/:name", post(handlers::events::record_event))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        .layer(TraceLayer::new_for_http())
}

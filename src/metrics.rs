use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics exporter
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "getstats_cycles_total",
        "Collection cycles, labelled by outcome"
    );
    describe_histogram!(
        "getstats_cycle_duration_seconds",
        "Duration of a collect-and-flush cycle in seconds"
    );
    describe_counter!(
        "getstats_points_written_total",
        "Data points committed to storage"
    );
    describe_counter!(
        "getstats_events_total",
        "Events received through the intake API"
    );
    describe_gauge!(
        "getstats_info",
        "Service version information"
    );

    gauge!("getstats_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record the outcome of a collection cycle
pub fn record_cycle(success: bool, duration: Duration) {
    let outcome = if success { "success" } else { "failure" };
    counter!("getstats_cycles_total", "outcome" => outcome).increment(1);
    histogram!("getstats_cycle_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record committed data points
pub fn record_points_written(count: u64) {
    counter!("getstats_points_written_total").increment(count);
}

/// Record an accepted event
pub fn record_event(name: &str) {
    counter!("getstats_events_total", "event" => name.to_string()).increment(1);
}

//! Offline timeseries queries
//!
//! Reads the database directly, without a running service.

use super::open_database;
use anyhow::Result;
use colored::Colorize;
use getstats::config::Config;
use getstats::storage::{parse_timestamp, DataPoint, Metric};
use serde_json::json;

/// Print the points of `name` between the optional bounds
pub async fn show(
    cfg: &Config,
    name: &str,
    from: Option<&str>,
    to: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let from = from.map(parse_timestamp).transpose()?;
    let to = to.map(parse_timestamp).transpose()?;

    let db = open_database(cfg).await?;
    let result = async {
        let metric = db.lookup(name).await?;
        let points = db.range(name, from, to).await?;
        Ok::<_, getstats::StatsError>((metric, points))
    }
    .await;
    db.close().await;

    let (metric, points) = result?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&series_json(&metric, &points))?);
    } else {
        print_series(&metric, &points);
    }

    Ok(())
}

/// Print every known timeseries
pub async fn list(cfg: &Config, as_json: bool) -> Result<()> {
    let db = open_database(cfg).await?;
    let result = db.list_series().await;
    db.close().await;
    let series = result?;

    if as_json {
        let entries: Vec<_> = series
            .iter()
            .map(|metric| json!({"name": metric.name, "kind": metric.kind}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&json!({ "timeseries": entries }))?);
        return Ok(());
    }

    println!("{}", "Known Timeseries".bold().underline());
    println!();

    if series.is_empty() {
        println!("{}", "No timeseries recorded yet".yellow());
        return Ok(());
    }

    for metric in &series {
        println!("{:<40} {}", metric.name.cyan(), metric.kind.to_string().dimmed());
    }
    println!();
    println!("{} timeseries", series.len());

    Ok(())
}

fn series_json(metric: &Metric, points: &[DataPoint]) -> serde_json::Value {
    json!({
        "timeseries": metric.name,
        "kind": metric.kind,
        "from": points.first().map(|p| p.timestamp),
        "to": points.last().map(|p| p.timestamp),
        "data": points,
    })
}

fn print_series(metric: &Metric, points: &[DataPoint]) {
    println!(
        "{} {}",
        metric.name.bold().underline(),
        format!("({})", metric.kind).dimmed()
    );
    println!();

    if points.is_empty() {
        println!("{}", "No data points in range".yellow());
        return;
    }

    for point in points {
        println!(
            "{:<30} {:>20}",
            point.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            point.value
        );
    }
    println!();
    println!("{} points", points.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use getstats::storage::MetricKind;

    #[test]
    fn test_series_json_bounds() {
        let metric = Metric {
            id: 1,
            name: "getinfo_num_peers".to_string(),
            kind: MetricKind::Gauge,
        };
        let points = vec![
            DataPoint {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                value: 3,
            },
            DataPoint {
                timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 15, 0).unwrap(),
                value: 4,
            },
        ];

        let value = series_json(&metric, &points);
        assert_eq!(value["kind"], "GAUGE");
        assert_eq!(value["from"], "2024-05-01T00:00:00Z");
        assert_eq!(value["to"], "2024-05-01T00:15:00Z");
        assert_eq!(value["data"][1]["value"], 4);
    }

    #[test]
    fn test_series_json_empty() {
        let metric = Metric {
            id: 1,
            name: "db_write".to_string(),
            kind: MetricKind::Counter,
        };
        let value = series_json(&metric, &[]);
        assert!(value["from"].is_null());
        assert_eq!(value["data"].as_array().unwrap().len(), 0);
    }
}

use super::{format_number, open_database};
use anyhow::{Context, Result};
use colored::Colorize;
use getstats::config::Config;
use getstats::storage::{default_migrations, StatsDb};

/// Apply pending migrations
pub async fn migrate(cfg: &Config) -> Result<()> {
    let db = StatsDb::connect(&cfg.database.url(), 1)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database.path))?;

    let result = db.migrate(&default_migrations()).await;
    db.close().await;
    let report = result?;

    if report.applied() == 0 {
        println!(
            "{}",
            format!("Schema already at version {}", report.to).dimmed()
        );
    } else {
        println!(
            "{} {} -> {} ({} applied)",
            "Schema migrated:".green().bold(),
            report.from,
            report.to,
            report.applied()
        );
    }

    Ok(())
}

/// Show database statistics
pub async fn status(cfg: &Config) -> Result<()> {
    let db = open_database(cfg).await?;
    let result = async {
        let stats = db.stats().await?;
        let series = db.list_series().await?;
        Ok::<_, getstats::StatsError>((stats, series))
    }
    .await;
    db.close().await;
    let (stats, series) = result?;

    let gauges = series
        .iter()
        .filter(|m| m.kind == getstats::MetricKind::Gauge)
        .count();

    println!("{}", "Stats Database".bold().underline());
    println!();
    println!("{:<30} {:>15}", "Path:", cfg.database.path);
    println!(
        "{:<30} {:>15}",
        "Schema Version:",
        format!("{}/{}", stats.schema_version, default_migrations().len())
    );
    println!("{:<30} {:>15}", "Timeseries:", format_number(stats.series_count));
    println!("{:<30} {:>15}", "  Gauges:", format_number(gauges as u64));
    println!(
        "{:<30} {:>15}",
        "  Counters:",
        format_number((series.len() - gauges) as u64)
    );
    println!(
        "{:<30} {:>15}",
        "Data Points:",
        format_number(stats.data_point_count)
    );
    println!();

    Ok(())
}

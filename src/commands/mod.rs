//! Command implementations for the CLI
//!
//! - start: Run the stats service
//! - series: Print one timeseries or list all of them
//! - database: Apply migrations and show database statistics

pub mod database;
pub mod series;
pub mod start;

use anyhow::{Context, Result};
use getstats::config::Config;
use getstats::storage::{default_migrations, StatsDb};

/// Open the configured database for an offline command
///
/// Never creates anything: a missing file is an error. Refuses a database
/// that has not been migrated yet, or one written by a newer release.
pub(crate) async fn open_database(cfg: &Config) -> Result<StatsDb> {
    let db = StatsDb::open_existing(&cfg.database.url(), 1)
        .await
        .with_context(|| format!("Failed to open database {}", cfg.database.path))?;

    let version = db.schema_version().await?;
    let known = default_migrations().len() as i64;

    if version == 0 {
        db.close().await;
        anyhow::bail!(
            "Database {} is not initialized, run `getstats migrate` first",
            cfg.database.path
        );
    }
    if version > known {
        db.close().await;
        anyhow::bail!(
            "Database {} has schema version {}, this release knows {}",
            cfg.database.path,
            version,
            known
        );
    }

    Ok(db)
}

/// Format large numbers with commas
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::new();

    for (count, ch) in s.chars().rev().enumerate() {
        if count > 0 && count % 3 == 0 {
            result.push(',');
        }
        result.push(ch);
    }

    result.chars().rev().collect()
}

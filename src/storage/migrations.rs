//! Versioned schema migrations
//!
//! Migrations are an ordered list; the 1-based position of a migration is its
//! sequence id. Each applied migration leaves one row in `migrations`, and the
//! highest sequence id is the schema version.

use super::current_millis;
use crate::error::{Result, StatsError};
use serde::Serialize;
use sqlx::SqlitePool;

/// Bound argument of a migration statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationArg {
    Int(i64),
    Text(String),
}

/// A single schema-change operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub sql: String,
    pub args: Vec<MigrationArg>,
}

impl Migration {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// Statement with bound arguments, e.g. to pre-seed a timeseries
    pub fn with_args(sql: impl Into<String>, args: Vec<MigrationArg>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    fn validate(&self, sequence: usize) -> Result<()> {
        if self.sql.trim().is_empty() {
            return Err(StatsError::InvalidMigration {
                sequence,
                reason: "missing statement text".to_string(),
            });
        }
        Ok(())
    }
}

/// Schema of the timeseries store
pub fn default_migrations() -> Vec<Migration> {
    vec![
        Migration::new(
            "CREATE TABLE timeseries (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, kind INTEGER NOT NULL)",
        ),
        Migration::new(
            "CREATE TABLE data (ts INTEGER NOT NULL, tsi INTEGER NOT NULL, value INTEGER NOT NULL,
             FOREIGN KEY(tsi) REFERENCES timeseries(id))",
        ),
        Migration::new("CREATE INDEX idx_data_id ON data (tsi)"),
        Migration::new("CREATE INDEX idx_data_ts ON data (ts)"),
        Migration::new("CREATE INDEX idx_data_idts ON data (tsi, ts)"),
    ]
}

/// Version transition performed by `apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub from: i64,
    pub to: i64,
}

impl MigrationReport {
    pub fn applied(&self) -> i64 {
        self.to - self.from
    }
}

async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            sequence_id INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Current schema version (0 when nothing has been applied)
pub async fn current_version(pool: &SqlitePool) -> Result<i64> {
    ensure_version_table(pool).await?;

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence_id) FROM migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Stored schema version without touching the schema
///
/// A database without a version table reports 0.
pub async fn stored_version(pool: &SqlitePool) -> Result<i64> {
    let has_table: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'migrations'",
    )
    .fetch_one(pool)
    .await?;

    if has_table == 0 {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(sequence_id) FROM migrations")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the stored version
///
/// Callers must hold the storage writer lock.
pub async fn apply(pool: &SqlitePool, migrations: &[Migration]) -> Result<MigrationReport> {
    let from = current_version(pool).await?;

    if from > migrations.len() as i64 {
        return Err(StatsError::SchemaTooNew {
            found: from,
            known: migrations.len(),
        });
    }

    let mut to = from;
    for (index, migration) in migrations.iter().enumerate().skip(from as usize) {
        let sequence = index + 1;
        migration.validate(sequence)?;

        tracing::debug!(sequence = sequence, sql = %migration.sql, "Applying migration");

        let mut tx = pool.begin().await?;

        let mut query = sqlx::query(&migration.sql);
        for arg in &migration.args {
            query = match arg {
                MigrationArg::Int(value) => query.bind(*value),
                MigrationArg::Text(value) => query.bind(value.as_str()),
            };
        }
        query.execute(&mut *tx).await?;

        sqlx::query("INSERT INTO migrations (sequence_id, applied_at) VALUES (?, ?)")
            .bind(sequence as i64)
            .bind(current_millis())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        to = sequence as i64;
    }

    if to != from {
        tracing::info!(from = from, to = to, "Database schema migrated");
    } else {
        tracing::info!(version = to, "Database schema is up to date");
    }

    Ok(MigrationReport { from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::test_support::temp_db;

    async fn migration_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM migrations")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_is_version_zero() {
        let (db, _dir) = temp_db().await;
        assert_eq!(current_version(db.pool()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stored_version_leaves_schema_alone() {
        let (db, _dir) = temp_db().await;
        assert_eq!(stored_version(db.pool()).await.unwrap(), 0);

        let tables: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(tables, 0);

        apply(db.pool(), &default_migrations()).await.unwrap();
        assert_eq!(stored_version(db.pool()).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_apply_default_migrations() {
        let (db, _dir) = temp_db().await;
        let migrations = default_migrations();

        let report = apply(db.pool(), &migrations).await.unwrap();
        assert_eq!(report, MigrationReport { from: 0, to: 5 });
        assert_eq!(report.applied(), 5);

        let ids: Vec<i64> = sqlx::query_scalar("SELECT sequence_id FROM migrations ORDER BY rowid")
            .fetch_all(db.pool())
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_reapply_is_noop() {
        let (db, _dir) = temp_db().await;
        let migrations = default_migrations();

        apply(db.pool(), &migrations).await.unwrap();
        let report = apply(db.pool(), &migrations).await.unwrap();

        assert_eq!(report, MigrationReport { from: 5, to: 5 });
        assert_eq!(migration_count(db.pool()).await, 5);
    }

    #[tokio::test]
    async fn test_incremental_migration() {
        let (db, _dir) = temp_db().await;
        let mut migrations = default_migrations();
        migrations.truncate(2);

        apply(db.pool(), &migrations).await.unwrap();

        let report = apply(db.pool(), &default_migrations()).await.unwrap();
        assert_eq!(report, MigrationReport { from: 2, to: 5 });
    }

    #[tokio::test]
    async fn test_schema_too_new() {
        let (db, _dir) = temp_db().await;
        apply(db.pool(), &default_migrations()).await.unwrap();

        let older_build: Vec<Migration> = default_migrations().into_iter().take(3).collect();
        let err = apply(db.pool(), &older_build).await.unwrap_err();

        assert!(matches!(err, StatsError::SchemaTooNew { found: 5, known: 3 }));
        assert_eq!(migration_count(db.pool()).await, 5);
    }

    #[tokio::test]
    async fn test_schema_too_new_regardless_of_content() {
        let (db, _dir) = temp_db().await;
        ensure_version_table(db.pool()).await.unwrap();
        sqlx::query("INSERT INTO migrations (sequence_id, applied_at) VALUES (42, 0)")
            .execute(db.pool())
            .await
            .unwrap();

        let err = apply(db.pool(), &default_migrations()).await.unwrap_err();
        assert!(matches!(err, StatsError::SchemaTooNew { found: 42, known: 5 }));
    }

    #[tokio::test]
    async fn test_invalid_migration_stops_before_later_ones() {
        let (db, _dir) = temp_db().await;
        let migrations = vec![
            Migration::new("CREATE TABLE a (x INTEGER)"),
            Migration::new("   "),
            Migration::new("CREATE TABLE b (x INTEGER)"),
        ];

        let err = apply(db.pool(), &migrations).await.unwrap_err();
        assert!(matches!(err, StatsError::InvalidMigration { sequence: 2, .. }));
        assert_eq!(current_version(db.pool()).await.unwrap(), 1);

        let b_exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'b'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        assert_eq!(b_exists, 0);
    }

    #[tokio::test]
    async fn test_failed_statement_is_not_recorded() {
        let (db, _dir) = temp_db().await;
        let migrations = vec![
            Migration::new("CREATE TABLE a (x INTEGER)"),
            Migration::new("INSERT INTO missing_table VALUES (1)"),
        ];

        assert!(apply(db.pool(), &migrations).await.is_err());
        assert_eq!(current_version(db.pool()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seed_migration_with_args() {
        let (db, _dir) = temp_db().await;
        let mut migrations = default_migrations();
        migrations.push(Migration::with_args(
            "INSERT INTO timeseries (name, kind) VALUES (?, ?)",
            vec![
                MigrationArg::Text("forward_event".to_string()),
                MigrationArg::Int(2),
            ],
        ));

        apply(db.pool(), &migrations).await.unwrap();

        let kind: i64 = sqlx::query_scalar("SELECT kind FROM timeseries WHERE name = 'forward_event'")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(kind, 2);
    }
}

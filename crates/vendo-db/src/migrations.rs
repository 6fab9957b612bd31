//! # Schema Migrations
//!
//! The SQL under `migrations/sqlite/` is compiled into the binary, so a
//! vendo service never starts against a schema older than its code.
//!
//! | File | Adds |
//! |------|------|
//! | `001_initial_schema.sql` | products, machines, slots, price_rules, sales, sales_archive |
//!
//! Applied files are recorded in `_sqlx_migrations` with their checksum.
//! Editing an applied file makes startup fail; schema changes go in a new
//! `NNN_*.sql` file.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies whatever embedded migrations the database has not seen yet.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let (total, applied_before) = migration_status(pool).await?;
    debug!(total, applied_before, "Schema status");

    MIGRATOR.run(pool).await?;

    if applied_before < total {
        info!(applied = total - applied_before, "Schema migrated");
    }
    Ok(())
}

/// `(embedded, applied)` counts. A fresh database reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    // The bookkeeping table only exists after the first run.
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((embedded, applied.max(0) as usize))
}

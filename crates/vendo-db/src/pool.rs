//! # Pool and Connection Settings
//!
//! One [`Database`] per process, shared by the sale lifecycle, the ledger and
//! the sweeper.
//!
//! ## Who Holds Connections
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  SaleLifecycle ──┐                                                      │
//! │  SlotStockLedger ├──► SqlitePool ──► vendo.db (WAL)                     │
//! │  Sweeper ────────┘        │                                             │
//! │                           │  acquire waits at most `connect_timeout`    │
//! │                           │  a locked database waits `busy_timeout`     │
//! │                           ▼                                             │
//! │                  one writer at a time (SQLite)                          │
//! │                                                                         │
//! │  :memory:  ──► exactly one connection, never reaped                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Readers in WAL mode never block the writer, so the sweeper's scans don't
//! stall reservations. Writers are serialized by SQLite itself; each ledger
//! movement is one conditional statement, which is all the per-slot locking
//! the engine needs.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::machine::MachineRepository;
use crate::repository::price_rule::PriceRuleRepository;
use crate::repository::product::ProductRepository;
use crate::repository::sale::SaleRepository;
use crate::repository::slot::SlotRepository;

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Pool settings.
///
/// ## Example
/// ```rust
/// use vendo_db::DbConfig;
///
/// let config = DbConfig::new("/var/lib/vendo/vendo.db")
///     .max_connections(8)
///     .min_connections(1);
/// assert_eq!(config.max_connections, 8);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file, or `:memory:`.
    pub database_path: PathBuf,

    /// Upper bound on open connections (default 5).
    pub max_connections: u32,

    /// Connections kept open while idle (default 1).
    pub min_connections: u32,

    /// Longest wait for a pooled connection (default 30s).
    pub connect_timeout: Duration,

    /// Longest wait on a locked database before the statement fails
    /// (default 5s).
    pub busy_timeout: Duration,

    /// Idle connections are closed after this; `None` keeps them.
    pub idle_timeout: Option<Duration>,

    /// Apply embedded migrations in [`Database::new`] (default true).
    pub run_migrations: bool,
}

impl DbConfig {
    /// Settings for a database file at `path`, created on first connect.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// A private in-memory database, used by tests.
    ///
    /// The database lives and dies with its connection, so the pool holds
    /// exactly one and never recycles it.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the pool; hands out repositories.
///
/// Clones share the same pool.
///
/// ## Usage
/// ```rust,ignore
/// let db = Database::new(DbConfig::in_memory()).await?;
/// let slot = db.slots().get_by_id(&slot_id).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and brings the schema up to date.
    ///
    /// ## Connection Settings
    /// - File databases: WAL journal, created if missing
    /// - `synchronous = NORMAL`
    /// - Foreign keys enforced
    /// - `busy_timeout` from the config
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            max_connections = config.max_connections,
            "Opening vendo database"
        );

        let base_options = if config.is_in_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
        } else {
            let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());
            SqliteConnectOptions::from_str(&connect_url)
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
                .journal_mode(SqliteJournalMode::Wal)
                .create_if_missing(true)
        };

        let connect_options = base_options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);

        if config.is_in_memory() {
            pool_options = pool_options.max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(in_memory = config.is_in_memory(), "Pool connected");

        let db = Database { pool };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Applies pending migrations. Safe to call repeatedly.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a transaction.
    ///
    /// ## Note
    /// While the transaction is open it owns one pool connection. With an
    /// in-memory pool that is the only connection, so nothing else may go
    /// through the pool until it commits or drops.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))
    }

    pub fn products(&self) -> ProductRepository {
        ProductRepository::new(self.pool.clone())
    }

    pub fn machines(&self) -> MachineRepository {
        MachineRepository::new(self.pool.clone())
    }

    /// Returns the slot repository (stock ledger statements).
    pub fn slots(&self) -> SlotRepository {
        SlotRepository::new(self.pool.clone())
    }

    pub fn price_rules(&self) -> PriceRuleRepository {
        PriceRuleRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Waits for checked-out connections to return, then closes the pool.
    /// Every later repository call fails.
    pub async fn close(&self) {
        info!("Closing vendo database");
        self.pool.close().await;
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database_is_migrated() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);

        let (total, applied) = migrations::migration_status(db.pool()).await.unwrap();
        assert_eq!(total, applied);
    }

    #[tokio::test]
    async fn test_in_memory_databases_are_isolated() {
        let a = Database::new(DbConfig::in_memory()).await.unwrap();
        let b = Database::new(DbConfig::in_memory()).await.unwrap();

        sqlx::query("INSERT INTO products (id, sku, name, active, created_at, updated_at) VALUES ('p', 'P-1', 'P', 1, '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')")
            .execute(a.pool())
            .await
            .unwrap();

        assert_eq!(a.products().count().await.unwrap(), 1);
        assert_eq!(b.products().count().await.unwrap(), 0);
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/srv/vendo/machines.db")
            .max_connections(3)
            .busy_timeout(Duration::from_millis(250))
            .run_migrations(false);

        assert_eq!(config.max_connections, 3);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        assert!(!config.run_migrations);
        assert!(!config.is_in_memory());
        assert!(DbConfig::in_memory().is_in_memory());
    }
}

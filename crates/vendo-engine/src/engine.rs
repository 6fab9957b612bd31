//! # Engine
//!
//! Wires the ledger, resolver, lifecycle and sweeper over one database
//! handle and one clock.
//!
//! ```rust,ignore
//! let config = EngineConfig::load_or_default(None);
//! let engine = Engine::connect(&config).await?;
//!
//! let sale = engine.lifecycle().create_sale(&slot_id, &product_id, 2).await?;
//! let sale = engine.lifecycle().reserve_stock(&sale.id).await?;
//!
//! let sweeper = engine.start_sweeper();
//! // ...
//! sweeper.shutdown().await?;
//! ```

use std::sync::Arc;
use tracing::info;

use vendo_core::{Clock, SystemClock};
use vendo_db::Database;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::ledger::SlotStockLedger;
use crate::lifecycle::SaleLifecycle;
use crate::pricing::PriceResolver;
use crate::sweeper::{ExpirationSweeper, SweeperHandle, SweeperRunner};

/// The assembled sales engine.
#[derive(Debug, Clone)]
pub struct Engine {
    config: EngineConfig,
    db: Database,
    clock: Arc<dyn Clock>,
    resolver: PriceResolver,
    ledger: SlotStockLedger,
    lifecycle: SaleLifecycle,
    sweeper: ExpirationSweeper,
}

impl Engine {
    /// Validates `config`, opens the database it names and runs on the
    /// system clock.
    pub async fn connect(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(config.clone(), db, Arc::new(SystemClock)))
    }

    /// Assembles an engine over an existing database and clock.
    pub fn new(config: EngineConfig, db: Database, clock: Arc<dyn Clock>) -> Self {
        let resolver = PriceResolver::new(db.clone(), clock.clone());
        let ledger = SlotStockLedger::new(db.clone(), resolver.clone(), clock.clone());
        let lifecycle = SaleLifecycle::new(
            db.clone(),
            ledger.clone(),
            clock.clone(),
            config.sales.clone(),
        );
        let sweeper = ExpirationSweeper::new(db.clone(), clock.clone());

        Engine {
            config,
            db,
            clock,
            resolver,
            ledger,
            lifecycle,
            sweeper,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn prices(&self) -> &PriceResolver {
        &self.resolver
    }

    pub fn ledger(&self) -> &SlotStockLedger {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &SaleLifecycle {
        &self.lifecycle
    }

    pub fn sweeper(&self) -> &ExpirationSweeper {
        &self.sweeper
    }

    /// Spawns the periodic sweeper with the configured settings.
    pub fn start_sweeper(&self) -> SweeperHandle {
        info!(
            interval_secs = self.config.sweeper.interval_secs,
            "Starting expiration sweeper"
        );
        SweeperRunner::new(self.sweeper.clone(), self.config.sweeper.clone()).start()
    }

    /// Closes the database pool.
    pub async fn close(&self) {
        self.db.close().await;
    }
}

//! # Expiration Sweeper
//!
//! Reclaims stock from paid sales whose pickup window has closed, and
//! optionally archives old terminal sales.
//!
//! ## Run Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   SweeperHandle ──Trigger/Shutdown──► ┌──────────────────────────┐      │
//! │   (cloneable)                         │      SweeperRunner       │      │
//! │                                       │                          │      │
//! │   interval tick ─────────────────────►│  sweep_expired()         │      │
//! │   (missed ticks delayed)              │  archive_terminal_sales()│      │
//! │                                       └──────────────────────────┘      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each expired sale is claimed with its own transaction (compare-and-set
//! `paid → expired`, then release). Two sweepers racing on the same sale
//! cannot both release its stock; the loser's compare-and-set matches no row.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use vendo_core::lifecycle::{transition, SaleOperation};
use vendo_core::{Clock, CoreError, CoreResult, Sale, SweepReport};
use vendo_db::{Database, SaleRepository};

use crate::config::SweeperSettings;
use crate::error::{EngineError, EngineResult, StorageContext};
use crate::ledger::SlotStockLedger;

// =============================================================================
// Expiration Sweeper
// =============================================================================

#[derive(Debug, Clone)]
pub struct ExpirationSweeper {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl ExpirationSweeper {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        ExpirationSweeper { db, clock }
    }

    /// Expires every paid sale whose deadline is strictly before now and
    /// returns its stock to the slot.
    ///
    /// Safe to run repeatedly and concurrently: a sale is only counted by
    /// the run that actually claimed it.
    #[instrument(skip(self))]
    pub async fn sweep_expired(&self) -> CoreResult<SweepReport> {
        let now = self.clock.now();

        let due: Vec<Sale> = self
            .db
            .sales()
            .list_expired(now)
            .await
            .storage("list expired sales")?;

        let mut report = SweepReport::default();

        for sale in &due {
            match self.expire_one(sale, now).await {
                Ok(true) => {
                    report.expired_sales += 1;
                    report.stock_released += sale.quantity;
                }
                Ok(false) => {
                    debug!(sale_id = %sale.id, "Sale already left paid state, skipping");
                }
                Err(err) => {
                    error!(sale_id = %sale.id, error = %err, "Failed to expire sale");
                }
            }
        }

        if report.expired_sales > 0 {
            info!(
                expired = report.expired_sales,
                released = report.stock_released,
                "Expired sales reclaimed"
            );
        } else {
            debug!(candidates = due.len(), "Nothing to expire");
        }

        Ok(report)
    }

    async fn expire_one(&self, sale: &Sale, now: chrono::DateTime<chrono::Utc>) -> CoreResult<bool> {
        transition(&sale.id, sale.state, SaleOperation::Expire)?;

        let mut tx = self.db.begin().await.storage("begin transaction")?;

        let claimed = SaleRepository::mark_expired(&mut *tx, &sale.id, now)
            .await
            .storage("mark expired")?;
        if !claimed {
            tx.rollback().await.storage("rollback")?;
            return Ok(false);
        }

        if let Err(err) =
            SlotStockLedger::release_on(&mut *tx, &sale.slot_id, sale.quantity, now).await
        {
            tx.rollback().await.storage("rollback")?;
            return Err(err);
        }

        tx.commit().await.storage("commit expiration")?;
        Ok(true)
    }

    /// Archives completed, cancelled and expired sales last touched more than
    /// `older_than` ago.
    #[instrument(skip_all, fields(days = older_than.num_days()))]
    pub async fn archive_terminal_sales(&self, older_than: chrono::Duration) -> CoreResult<u64> {
        if older_than < chrono::Duration::zero() {
            return Err(CoreError::business_rule("archive age must not be negative"));
        }

        let cutoff = self.clock.now() - older_than;
        self.db
            .sales()
            .archive_terminal(cutoff)
            .await
            .storage("archive terminal sales")
    }
}

// =============================================================================
// Runner
// =============================================================================

#[derive(Debug)]
enum SweeperCommand {
    /// Sweep now and report back.
    Trigger(oneshot::Sender<CoreResult<SweepReport>>),
    /// Stop the loop; acknowledged once it has exited.
    Shutdown(oneshot::Sender<()>),
}

/// Handle for controlling a running [`SweeperRunner`].
#[derive(Debug, Clone)]
pub struct SweeperHandle {
    cmd_tx: mpsc::Sender<SweeperCommand>,
}

impl SweeperHandle {
    /// Runs a sweep immediately, outside the interval.
    pub async fn trigger(&self) -> EngineResult<SweepReport> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.cmd_tx
            .send(SweeperCommand::Trigger(reply_tx))
            .await
            .map_err(|_| EngineError::ShuttingDown)?;

        let report = reply_rx
            .await
            .map_err(|_| EngineError::ChannelError("Sweeper dropped the reply".into()))??;

        Ok(report)
    }

    /// Stops the runner and waits for it to exit.
    pub async fn shutdown(&self) -> EngineResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();

        self.cmd_tx
            .send(SweeperCommand::Shutdown(ack_tx))
            .await
            .map_err(|_| EngineError::ShuttingDown)?;

        ack_rx
            .await
            .map_err(|_| EngineError::ChannelError("Sweeper exited without acknowledging".into()))
    }
}

/// Periodic driver for an [`ExpirationSweeper`].
pub struct SweeperRunner {
    sweeper: ExpirationSweeper,
    settings: SweeperSettings,
}

impl SweeperRunner {
    pub fn new(sweeper: ExpirationSweeper, settings: SweeperSettings) -> Self {
        SweeperRunner { sweeper, settings }
    }

    /// Spawns the loop and returns a handle to it.
    pub fn start(self) -> SweeperHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        tokio::spawn(async move {
            self.run(cmd_rx).await;
        });

        SweeperHandle { cmd_tx }
    }

    async fn run(self, mut cmd_rx: mpsc::Receiver<SweeperCommand>) {
        info!(
            interval_secs = self.settings.interval_secs,
            archive_after_days = ?self.settings.archive_after_days,
            "Expiration sweeper started"
        );

        let mut ticker = interval(self.settings.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(SweeperCommand::Trigger(reply)) => {
                            let result = self.cycle().await;
                            let _ = reply.send(result);
                        }
                        Some(SweeperCommand::Shutdown(ack)) => {
                            info!("Expiration sweeper shutting down");
                            let _ = ack.send(());
                            break;
                        }
                        None => {
                            info!("All sweeper handles dropped, stopping");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.cycle().await {
                        warn!(error = %err, "Scheduled sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep, followed by archival when configured.
    async fn cycle(&self) -> CoreResult<SweepReport> {
        let report = self.sweeper.sweep_expired().await?;

        if let Some(age) = self.settings.archive_after() {
            if let Err(err) = self.sweeper.archive_terminal_sales(age).await {
                warn!(error = %err, "Archival failed");
            }
        }

        Ok(report)
    }
}

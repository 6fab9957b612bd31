//! # Slot Stock Ledger
//!
//! Capacity, availability and reservation accounting per slot.
//!
//! ## Operation Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  reserve(slot, q)                                                      │
//! │     │  validate q > 0                                                  │
//! │     ▼                                                                   │
//! │  UPDATE ... WHERE active AND available >= q  RETURNING counters        │
//! │     │                                                                   │
//! │     ├── row returned ──► Ok(levels)                                    │
//! │     │                                                                   │
//! │     └── no row ──► re-read slot                                        │
//! │                      ├── missing   ──► NotFound                        │
//! │                      ├── inactive  ──► BusinessRule                    │
//! │                      └── otherwise ──► InsufficientStock               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent reservations on one slot serialize on SQLite's write lock;
//! whichever statement runs second sees the first one's result, so the sum
//! of successful reservations never exceeds what was available.
//!
//! The `*_on` variants run on a caller-supplied connection, which is how the
//! sale lifecycle puts a ledger movement and a sale transition in the same
//! transaction.

use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use vendo_core::validation::{validate_initial_stock, validate_quantity, validate_uuid};
use vendo_core::{Clock, CoreError, CoreResult, Slot, StockLevels, PRODUCT_ENTITY_TYPE};
use vendo_db::{Database, SlotRepository};

use crate::error::StorageContext;
use crate::pricing::PriceResolver;

/// Atomic stock accounting for dispensing slots.
#[derive(Debug, Clone)]
pub struct SlotStockLedger {
    db: Database,
    resolver: PriceResolver,
    clock: Arc<dyn Clock>,
}

impl SlotStockLedger {
    pub fn new(db: Database, resolver: PriceResolver, clock: Arc<dyn Clock>) -> Self {
        SlotStockLedger {
            db,
            resolver,
            clock,
        }
    }

    /// Current snapshot of a slot.
    pub async fn slot(&self, slot_id: &str) -> CoreResult<Slot> {
        validate_uuid("slot_id", slot_id)?;

        self.db
            .slots()
            .get_by_id(slot_id)
            .await
            .storage("load slot")?
            .ok_or_else(|| CoreError::not_found("Slot", slot_id))
    }

    // =========================================================================
    // Counter Operations
    // =========================================================================

    /// Moves `qty` units from available to reserved.
    ///
    /// ## Errors
    /// - `Validation` - `qty <= 0`
    /// - `NotFound` - no such slot
    /// - `BusinessRule` - slot is inactive
    /// - `InsufficientStock` - fewer than `qty` units available
    #[instrument(skip_all, fields(slot_id = %slot_id, qty = qty))]
    pub async fn reserve(&self, slot_id: &str, qty: i64) -> CoreResult<StockLevels> {
        validate_uuid("slot_id", slot_id)?;
        validate_quantity(qty)?;

        let mut conn = self.db.pool().acquire().await.storage("acquire connection")?;
        Self::reserve_on(&mut *conn, slot_id, qty, self.clock.now()).await
    }

    /// Returns up to `qty` reserved units to availability.
    #[instrument(skip_all, fields(slot_id = %slot_id, qty = qty))]
    pub async fn release(&self, slot_id: &str, qty: i64) -> CoreResult<StockLevels> {
        validate_uuid("slot_id", slot_id)?;
        validate_quantity(qty)?;

        let mut conn = self.db.pool().acquire().await.storage("acquire connection")?;
        Self::release_on(&mut *conn, slot_id, qty, self.clock.now()).await
    }

    /// Removes up to `qty` dispensed units from the reserved count.
    #[instrument(skip_all, fields(slot_id = %slot_id, qty = qty))]
    pub async fn consume(&self, slot_id: &str, qty: i64) -> CoreResult<StockLevels> {
        validate_uuid("slot_id", slot_id)?;
        validate_quantity(qty)?;

        let mut conn = self.db.pool().acquire().await.storage("acquire connection")?;
        Self::consume_on(&mut *conn, slot_id, qty, self.clock.now()).await
    }

    pub(crate) async fn reserve_on(
        conn: &mut SqliteConnection,
        slot_id: &str,
        qty: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<StockLevels> {
        if let Some(levels) = SlotRepository::reserve(&mut *conn, slot_id, qty, now)
            .await
            .storage("reserve stock")?
        {
            debug!(
                qty,
                available = levels.stock_available,
                reserved = levels.stock_reserved,
                "Stock reserved"
            );
            return Ok(levels);
        }

        let slot = SlotRepository::fetch(&mut *conn, slot_id)
            .await
            .storage("load slot")?
            .ok_or_else(|| CoreError::not_found("Slot", slot_id))?;

        if !slot.active {
            return Err(CoreError::business_rule(format!("slot {} is inactive", slot_id)));
        }

        debug!(qty, available = slot.stock_available, "Reservation refused");
        Err(CoreError::InsufficientStock {
            slot_id: slot_id.to_string(),
            available: slot.stock_available,
            requested: qty,
        })
    }

    pub(crate) async fn release_on(
        conn: &mut SqliteConnection,
        slot_id: &str,
        qty: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<StockLevels> {
        let levels = SlotRepository::release(&mut *conn, slot_id, qty, now)
            .await
            .storage("release stock")?
            .ok_or_else(|| CoreError::not_found("Slot", slot_id))?;

        debug!(
            qty,
            available = levels.stock_available,
            reserved = levels.stock_reserved,
            "Stock released"
        );
        Ok(levels)
    }

    pub(crate) async fn consume_on(
        conn: &mut SqliteConnection,
        slot_id: &str,
        qty: i64,
        now: chrono::DateTime<chrono::Utc>,
    ) -> CoreResult<StockLevels> {
        let levels = SlotRepository::consume(&mut *conn, slot_id, qty, now)
            .await
            .storage("consume stock")?
            .ok_or_else(|| CoreError::not_found("Slot", slot_id))?;

        debug!(qty, reserved = levels.stock_reserved, "Stock consumed");
        Ok(levels)
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    /// Loads a product into a slot and prices it.
    ///
    /// The price is resolved in the machine's location context first. The
    /// product, the reset counters and the price override are then written by
    /// one statement, so no reader sees the new product without its price.
    ///
    /// A failed or empty price lookup leaves the slot without an override;
    /// it is logged, not returned.
    #[instrument(skip_all, fields(slot_id = %slot_id, product_id = %product_id))]
    pub async fn assign_product(
        &self,
        slot_id: &str,
        product_id: &str,
        initial_stock: i64,
    ) -> CoreResult<Slot> {
        validate_uuid("slot_id", slot_id)?;
        validate_uuid("product_id", product_id)?;
        validate_initial_stock(initial_stock)?;

        let slot = self.slot(slot_id).await?;
        let product = self
            .db
            .products()
            .get_by_id(product_id)
            .await
            .storage("load product")?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        if !product.active {
            return Err(CoreError::business_rule(format!(
                "product {} is inactive",
                product.sku
            )));
        }

        if initial_stock > slot.capacity {
            return Err(CoreError::business_rule(format!(
                "initial stock {} exceeds slot capacity {}",
                initial_stock, slot.capacity
            )));
        }

        if slot.stock_reserved > 0 {
            warn!(
                reserved = slot.stock_reserved,
                "Reassigning slot with outstanding reservations"
            );
        }

        let price = self.resolve_slot_price(&slot, product_id).await;

        let now = self.clock.now();
        self.db
            .slots()
            .assign_product(slot_id, product_id, initial_stock, price, now)
            .await
            .storage("assign product")?
            .ok_or_else(|| {
                CoreError::business_rule(format!(
                    "initial stock {} exceeds slot capacity",
                    initial_stock
                ))
            })?;

        info!(initial_stock, price_override = ?price, "Product assigned to slot");
        self.slot(slot_id).await
    }

    /// Resolver failures are swallowed here by contract.
    async fn resolve_slot_price(&self, slot: &Slot, product_id: &str) -> Option<i64> {
        let machine = match self.db.machines().get_by_id(&slot.machine_id).await {
            Ok(Some(machine)) => machine,
            Ok(None) => {
                warn!(machine_id = %slot.machine_id, "Machine not found, slot left unpriced");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load machine, slot left unpriced");
                return None;
            }
        };

        match self
            .resolver
            .resolve(PRODUCT_ENTITY_TYPE, product_id, &machine.price_context())
            .await
        {
            Ok(Some(hit)) => {
                debug!(level = %hit.level, amount = %hit.amount, "Slot price resolved");
                Some(hit.amount.cents())
            }
            Ok(None) => {
                warn!("No active price rule, slot left unpriced");
                None
            }
            Err(e) => {
                warn!(error = %e, "Price resolution failed, slot left unpriced");
                None
            }
        }
    }

    /// Takes a slot in or out of service.
    #[instrument(skip_all, fields(slot_id = %slot_id, active = active))]
    pub async fn set_active(&self, slot_id: &str, active: bool) -> CoreResult<Slot> {
        validate_uuid("slot_id", slot_id)?;

        self.db
            .slots()
            .set_active(slot_id, active, self.clock.now())
            .await
            .storage("set slot active")?;

        info!(active, "Slot status changed");
        self.slot(slot_id).await
    }
}

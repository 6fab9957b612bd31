//! # Sale Lifecycle
//!
//! Drives a sale through its states and keeps the slot ledger in step.
//!
//! ## State Graph
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   draft ──reserve──► reserved ──confirm_payment──► paid                │
//! │     │                   │                           │  │               │
//! │     │                   │              confirm_pickup  │ (sweeper)     │
//! │     │                   │                           ▼  ▼               │
//! │     │                   │                   completed  expired         │
//! │     └───────cancel──────┴──────────cancel───────────┘                  │
//! │                         ▼                                               │
//! │                     cancelled                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions
//! Every step that moves stock opens one transaction whose first statement
//! is the sale compare-and-set (`WHERE id = ? AND state = ?`); the ledger
//! statement follows on the same connection. Losing the compare-and-set
//! means another caller moved the sale first, and the transaction is rolled
//! back untouched.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use vendo_core::lifecycle::transition;
use vendo_core::validation::{
    validate_cancel_reason, validate_payment_id, validate_quantity, validate_ttl_minutes,
    validate_uuid,
};
use vendo_core::{
    CancellationOutcome, Clock, CoreError, CoreResult, Money, PaymentConfirmation, PickupCode,
    PickupConfirmation, Sale, SaleOperation, SaleState,
};
use vendo_db::{generate_id, Database, SaleRepository};

use crate::config::SalesSettings;
use crate::error::StorageContext;
use crate::ledger::SlotStockLedger;

/// How often `cancel_sale` re-reads a sale whose state moved underneath it.
const CANCEL_ATTEMPTS: u32 = 3;

/// Sale state machine bound to storage and the slot ledger.
#[derive(Debug, Clone)]
pub struct SaleLifecycle {
    db: Database,
    ledger: SlotStockLedger,
    clock: Arc<dyn Clock>,
    settings: SalesSettings,
}

impl SaleLifecycle {
    pub fn new(
        db: Database,
        ledger: SlotStockLedger,
        clock: Arc<dyn Clock>,
        settings: SalesSettings,
    ) -> Self {
        SaleLifecycle {
            db,
            ledger,
            clock,
            settings,
        }
    }

    /// Current snapshot of a sale.
    pub async fn get(&self, sale_id: &str) -> CoreResult<Sale> {
        validate_uuid("sale_id", sale_id)?;
        self.load(sale_id).await
    }

    async fn load(&self, sale_id: &str) -> CoreResult<Sale> {
        self.db
            .sales()
            .get_by_id(sale_id)
            .await
            .storage("load sale")?
            .ok_or_else(|| CoreError::not_found("Sale", sale_id))
    }

    /// Error for a lost compare-and-set, phrased against the state the sale
    /// is in now.
    async fn lost_race(&self, sale_id: &str, op: SaleOperation) -> CoreError {
        match self.load(sale_id).await {
            Ok(current) => match transition(sale_id, current.state, op) {
                Err(err) => err,
                Ok(_) => CoreError::Internal(format!(
                    "sale {} changed state during {}",
                    sale_id, op
                )),
            },
            Err(err) => err,
        }
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Creates a draft sale priced from the slot's override.
    ///
    /// ## Errors
    /// - `NotFound` - slot or product missing
    /// - `BusinessRule` - slot inactive, product mismatch, quantity above
    ///   capacity, or no price available
    pub async fn create_sale(&self, slot_id: &str, product_id: &str, qty: i64) -> CoreResult<Sale> {
        self.create_sale_with_fallback(slot_id, product_id, qty, None)
            .await
    }

    /// Like [`create_sale`](Self::create_sale), using `fallback` as the unit
    /// price when the slot carries no override.
    #[instrument(skip_all, fields(slot_id = %slot_id, product_id = %product_id, qty = qty))]
    pub async fn create_sale_with_fallback(
        &self,
        slot_id: &str,
        product_id: &str,
        qty: i64,
        fallback: Option<Money>,
    ) -> CoreResult<Sale> {
        validate_uuid("slot_id", slot_id)?;
        validate_uuid("product_id", product_id)?;
        validate_quantity(qty)?;

        let slot = self.ledger.slot(slot_id).await?;
        let product = self
            .db
            .products()
            .get_by_id(product_id)
            .await
            .storage("load product")?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        if !slot.active {
            return Err(CoreError::business_rule(format!("slot {} is inactive", slot_id)));
        }
        if !product.active {
            return Err(CoreError::business_rule(format!(
                "product {} is inactive",
                product.sku
            )));
        }
        if slot.product_id.as_deref() != Some(product_id) {
            return Err(CoreError::business_rule(format!(
                "slot {} is not loaded with product {}",
                slot_id, product.sku
            )));
        }
        if qty > slot.capacity {
            return Err(CoreError::business_rule(format!(
                "quantity {} exceeds slot capacity {}",
                qty, slot.capacity
            )));
        }

        let unit_price = match (slot.price_override(), fallback) {
            (Some(price), _) => price,
            (None, Some(price)) if price.is_negative() => {
                return Err(CoreError::business_rule("fallback price must not be negative"));
            }
            (None, Some(price)) => {
                debug!(price = %price, "Slot has no price override, using fallback");
                price
            }
            (None, None) => {
                return Err(CoreError::business_rule(format!(
                    "slot {} has no price",
                    slot_id
                )));
            }
        };

        let total = unit_price
            .checked_multiply_quantity(qty)
            .ok_or_else(|| CoreError::business_rule("sale total overflows"))?;

        let now = self.clock.now();
        let sale = Sale {
            id: generate_id(),
            slot_id: slot_id.to_string(),
            product_id: product_id.to_string(),
            quantity: qty,
            unit_price_cents: unit_price.cents(),
            total_price_cents: total.cents(),
            state: SaleState::Draft,
            pickup_code: None,
            payment_id: None,
            created_at: now,
            updated_at: now,
            reserved_at: None,
            paid_at: None,
            expires_at: None,
            picked_up_at: None,
            cancelled_at: None,
            cancel_reason: None,
            expired_at: None,
        };

        self.db.sales().insert(&sale).await.storage("insert sale")?;

        info!(sale_id = %sale.id, qty, total = %total, "Sale created");
        Ok(sale)
    }

    // =========================================================================
    // Reserve
    // =========================================================================

    /// `draft → reserved`, holding `quantity` units in the slot.
    #[instrument(skip_all, fields(sale_id = %sale_id))]
    pub async fn reserve_stock(&self, sale_id: &str) -> CoreResult<Sale> {
        validate_uuid("sale_id", sale_id)?;

        let sale = self.load(sale_id).await?;
        transition(sale_id, sale.state, SaleOperation::Reserve)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await.storage("begin transaction")?;

        let claimed = SaleRepository::mark_reserved(&mut *tx, sale_id, now)
            .await
            .storage("mark reserved")?;
        if !claimed {
            tx.rollback().await.storage("rollback")?;
            return Err(self.lost_race(sale_id, SaleOperation::Reserve).await);
        }

        let levels =
            match SlotStockLedger::reserve_on(&mut *tx, &sale.slot_id, sale.quantity, now).await {
                Ok(levels) => levels,
                Err(err) => {
                    tx.rollback().await.storage("rollback")?;
                    return Err(err);
                }
            };

        tx.commit().await.storage("commit reservation")?;

        info!(
            slot_id = %sale.slot_id,
            qty = sale.quantity,
            available = levels.stock_available,
            "Stock reserved for sale"
        );
        self.load(sale_id).await
    }

    // =========================================================================
    // Payment
    // =========================================================================

    /// `reserved → paid`. Issues a pickup code valid for `ttl_minutes`
    /// (configured default when `None`).
    ///
    /// ## Code Uniqueness
    /// A drawn code is checked against open sales, then the partial unique
    /// index catches whatever slipped between check and write. Either
    /// collision draws again, up to `pickup_code_attempts` times.
    #[instrument(skip_all, fields(sale_id = %sale_id))]
    pub async fn confirm_payment(
        &self,
        sale_id: &str,
        payment_id: &str,
        ttl_minutes: Option<i64>,
    ) -> CoreResult<PaymentConfirmation> {
        validate_uuid("sale_id", sale_id)?;
        validate_payment_id(payment_id)?;
        let ttl = ttl_minutes.unwrap_or(self.settings.payment_ttl_minutes);
        validate_ttl_minutes(ttl)?;

        let sale = self.load(sale_id).await?;
        let next = transition(sale_id, sale.state, SaleOperation::ConfirmPayment)?;

        let paid_at = self.clock.now();
        let expires_at = paid_at + Duration::minutes(ttl);
        let sales = self.db.sales();

        for attempt in 1..=self.settings.pickup_code_attempts {
            let code = PickupCode::generate(&mut rand::thread_rng());

            if sales
                .pickup_code_in_use(code.as_str())
                .await
                .storage("check pickup code")?
            {
                debug!(attempt, "Pickup code already open, drawing again");
                continue;
            }

            match SaleRepository::mark_paid(
                self.db.pool(),
                sale_id,
                payment_id.trim(),
                code.as_str(),
                paid_at,
                expires_at,
            )
            .await
            {
                Ok(true) => {
                    info!(ttl_minutes = ttl, expires_at = %expires_at, "Payment confirmed");
                    return Ok(PaymentConfirmation {
                        sale_id: sale_id.to_string(),
                        state: next,
                        pickup_code: code.into_string(),
                        paid_at,
                        expires_at,
                    });
                }
                Ok(false) => {
                    return Err(self.lost_race(sale_id, SaleOperation::ConfirmPayment).await);
                }
                Err(err) if err.is_unique_violation_on("pickup_code") => {
                    warn!(attempt, "Pickup code collided on write, drawing again");
                }
                Err(err) => return Err(err).storage("mark paid"),
            }
        }

        Err(CoreError::Internal(format!(
            "no free pickup code after {} attempts",
            self.settings.pickup_code_attempts
        )))
    }

    // =========================================================================
    // Pickup
    // =========================================================================

    /// `paid → completed` when `code` matches and the window is still open.
    ///
    /// ## Check Order
    /// 1. Code well-formed (`Validation`)
    /// 2. Sale is paid (`InvalidStateTransition`)
    /// 3. Deadline not reached (`PickupExpired`)
    /// 4. Code matches (`InvalidPickupCode`)
    ///
    /// None of the failures mutate the sale.
    #[instrument(skip_all, fields(sale_id = %sale_id))]
    pub async fn confirm_pickup(&self, sale_id: &str, code: &str) -> CoreResult<PickupConfirmation> {
        validate_uuid("sale_id", sale_id)?;
        let code = PickupCode::parse(code)?;

        let sale = self.load(sale_id).await?;
        let next = transition(sale_id, sale.state, SaleOperation::ConfirmPickup)?;

        let now = self.clock.now();
        if sale.is_past_deadline(now) {
            let expires_at = sale.expires_at.unwrap_or(now);
            warn!(expires_at = %expires_at, "Pickup attempted after deadline");
            return Err(CoreError::PickupExpired {
                sale_id: sale_id.to_string(),
                expires_at,
            });
        }

        if sale.pickup_code.as_deref() != Some(code.as_str()) {
            warn!("Pickup code mismatch");
            return Err(CoreError::InvalidPickupCode {
                sale_id: sale_id.to_string(),
            });
        }

        let mut tx = self.db.begin().await.storage("begin transaction")?;

        let claimed = SaleRepository::mark_completed(&mut *tx, sale_id, code.as_str(), now)
            .await
            .storage("mark completed")?;
        if !claimed {
            tx.rollback().await.storage("rollback")?;
            return Err(self.lost_race(sale_id, SaleOperation::ConfirmPickup).await);
        }

        if let Err(err) =
            SlotStockLedger::consume_on(&mut *tx, &sale.slot_id, sale.quantity, now).await
        {
            tx.rollback().await.storage("rollback")?;
            return Err(err);
        }

        tx.commit().await.storage("commit pickup")?;

        info!(slot_id = %sale.slot_id, qty = sale.quantity, "Pickup confirmed");
        Ok(PickupConfirmation {
            sale_id: sale_id.to_string(),
            state: next,
            picked_up_at: now,
        })
    }

    // =========================================================================
    // Cancel
    // =========================================================================

    /// Cancels a non-terminal sale, returning held stock to the slot.
    #[instrument(skip_all, fields(sale_id = %sale_id))]
    pub async fn cancel_sale(&self, sale_id: &str, reason: &str) -> CoreResult<CancellationOutcome> {
        validate_uuid("sale_id", sale_id)?;
        validate_cancel_reason(reason)?;
        let reason = reason.trim();

        for _ in 0..CANCEL_ATTEMPTS {
            let sale = self.load(sale_id).await?;
            let next = transition(sale_id, sale.state, SaleOperation::Cancel)?;
            let now = self.clock.now();

            let mut tx = self.db.begin().await.storage("begin transaction")?;

            let claimed = SaleRepository::mark_cancelled(&mut *tx, sale_id, sale.state, reason, now)
                .await
                .storage("mark cancelled")?;
            if !claimed {
                tx.rollback().await.storage("rollback")?;
                debug!(from = %sale.state, "Sale moved during cancel, re-reading");
                continue;
            }

            let stock_released = sale.state.holds_stock();
            if stock_released {
                if let Err(err) =
                    SlotStockLedger::release_on(&mut *tx, &sale.slot_id, sale.quantity, now).await
                {
                    tx.rollback().await.storage("rollback")?;
                    return Err(err);
                }
            }

            tx.commit().await.storage("commit cancellation")?;

            info!(from = %sale.state, stock_released, "Sale cancelled");
            return Ok(CancellationOutcome {
                sale_id: sale_id.to_string(),
                state: next,
                stock_released,
            });
        }

        Err(self.lost_race(sale_id, SaleOperation::Cancel).await)
    }
}

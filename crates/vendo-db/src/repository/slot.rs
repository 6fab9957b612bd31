//! # Slot Repository
//!
//! The stock ledger's storage half. Every counter change is one
//! conditional `UPDATE ... RETURNING`, so the check and the write happen
//! inside the same SQLite write lock and there is no read-modify-write
//! window between concurrent buyers.
//!
//! ## Ledger Statements
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve(q)   available -= q, reserved += q                            │
//! │               WHERE active AND available >= q                          │
//! │                                                                         │
//! │  release(q)   available += min(q, reserved)   (capped at capacity)     │
//! │               reserved  -= q                  (floored at 0)           │
//! │                                                                         │
//! │  consume(q)   reserved  -= q                  (floored at 0)           │
//! │                                                                         │
//! │  Each returns the new counters, or None when no row matched.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger statements are associated functions generic over the
//! executor, so callers can run them on the pool or inside a transaction:
//!
//! ```rust,ignore
//! let mut tx = db.begin().await?;
//! let levels = SlotRepository::reserve(&mut *tx, &slot_id, 3, now).await?;
//! SaleRepository::mark_reserved(&mut *tx, &sale_id, now).await?;
//! tx.commit().await?;
//! ```

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendo_core::{Slot, StockLevels};

const SLOT_COLUMNS: &str = r#"
    id, machine_id, position, product_id, capacity,
    stock_available, stock_reserved, price_override_cents,
    active, created_at, updated_at
"#;

/// Repository for slot database operations.
#[derive(Debug, Clone)]
pub struct SlotRepository {
    pool: SqlitePool,
}

impl SlotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SlotRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Slot>> {
        Self::fetch(&self.pool, id).await
    }

    /// Slots of a machine in position order.
    pub async fn list_by_machine(&self, machine_id: &str) -> DbResult<Vec<Slot>> {
        let sql = format!(
            "SELECT {SLOT_COLUMNS} FROM slots WHERE machine_id = ?1 ORDER BY position"
        );
        let slots = sqlx::query_as::<_, Slot>(&sql)
            .bind(machine_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(slots)
    }

    /// Reads a slot through any executor.
    pub async fn fetch<'c, E>(executor: E, id: &str) -> DbResult<Option<Slot>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let sql = format!("SELECT {SLOT_COLUMNS} FROM slots WHERE id = ?1");
        let slot = sqlx::query_as::<_, Slot>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(slot)
    }

    pub async fn insert<'c, E>(executor: E, slot: &Slot) -> DbResult<()>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        debug!(id = %slot.id, machine_id = %slot.machine_id, position = slot.position, "Inserting slot");

        sqlx::query(
            r#"
            INSERT INTO slots (
                id, machine_id, position, product_id, capacity,
                stock_available, stock_reserved, price_override_cents,
                active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&slot.id)
        .bind(&slot.machine_id)
        .bind(slot.position)
        .bind(&slot.product_id)
        .bind(slot.capacity)
        .bind(slot.stock_available)
        .bind(slot.stock_reserved)
        .bind(slot.price_override_cents)
        .bind(slot.active)
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Ledger Statements
    // =========================================================================

    /// Moves `qty` units from available to reserved if the slot is active
    /// and has enough available stock.
    ///
    /// `None` means nothing changed; re-read the slot to find out why.
    pub async fn reserve<'c, E>(
        executor: E,
        id: &str,
        qty: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<StockLevels>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let levels = sqlx::query_as::<_, StockLevels>(
            r#"
            UPDATE slots
            SET stock_available = stock_available - ?2,
                stock_reserved = stock_reserved + ?2,
                updated_at = ?3
            WHERE id = ?1 AND active = 1 AND stock_available >= ?2
            RETURNING capacity, stock_available, stock_reserved
            "#,
        )
        .bind(id)
        .bind(qty)
        .bind(now)
        .fetch_optional(executor)
        .await?;

        Ok(levels)
    }

    /// Returns reserved units to availability.
    ///
    /// Clamped: at most `stock_reserved` units move, and availability never
    /// exceeds capacity. `None` means the slot doesn't exist.
    pub async fn release<'c, E>(
        executor: E,
        id: &str,
        qty: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<StockLevels>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let levels = sqlx::query_as::<_, StockLevels>(
            r#"
            UPDATE slots
            SET stock_available = MIN(capacity, stock_available + MIN(?2, stock_reserved)),
                stock_reserved = MAX(stock_reserved - ?2, 0),
                updated_at = ?3
            WHERE id = ?1
            RETURNING capacity, stock_available, stock_reserved
            "#,
        )
        .bind(id)
        .bind(qty)
        .bind(now)
        .fetch_optional(executor)
        .await?;

        Ok(levels)
    }

    /// Removes dispensed units from the reserved count. Availability is
    /// untouched. `None` means the slot doesn't exist.
    pub async fn consume<'c, E>(
        executor: E,
        id: &str,
        qty: i64,
        now: DateTime<Utc>,
    ) -> DbResult<Option<StockLevels>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let levels = sqlx::query_as::<_, StockLevels>(
            r#"
            UPDATE slots
            SET stock_reserved = MAX(stock_reserved - ?2, 0),
                updated_at = ?3
            WHERE id = ?1
            RETURNING capacity, stock_available, stock_reserved
            "#,
        )
        .bind(id)
        .bind(qty)
        .bind(now)
        .fetch_optional(executor)
        .await?;

        Ok(levels)
    }

    // =========================================================================
    // Assignment
    // =========================================================================

    /// Loads `product_id` into the slot with `initial_stock` available units,
    /// no reservations and `price_override_cents` as its price, all in one
    /// statement. `None` as the price leaves the slot unpriced.
    ///
    /// `None` means the slot doesn't exist or `initial_stock` exceeds its
    /// capacity.
    pub async fn assign_product(
        &self,
        id: &str,
        product_id: &str,
        initial_stock: i64,
        price_override_cents: Option<i64>,
        now: DateTime<Utc>,
    ) -> DbResult<Option<StockLevels>> {
        debug!(id = %id, product_id = %product_id, initial_stock, "Assigning product to slot");

        let levels = sqlx::query_as::<_, StockLevels>(
            r#"
            UPDATE slots
            SET product_id = ?2,
                stock_available = ?3,
                stock_reserved = 0,
                price_override_cents = ?4,
                updated_at = ?5
            WHERE id = ?1 AND capacity >= ?3
            RETURNING capacity, stock_available, stock_reserved
            "#,
        )
        .bind(id)
        .bind(product_id)
        .bind(initial_stock)
        .bind(price_override_cents)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(levels)
    }

    /// Takes a slot in or out of service. Existing reservations are kept.
    pub async fn set_active(&self, id: &str, active: bool, now: DateTime<Utc>) -> DbResult<()> {
        let result = sqlx::query("UPDATE slots SET active = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .bind(now)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Slot", id));
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

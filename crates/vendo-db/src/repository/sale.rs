//! # Sale Repository
//!
//! Database operations for sales.
//!
//! ## Compare-and-Set Transitions
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UPDATE sales SET state = 'paid', ...                                  │
//! │  WHERE id = ?1 AND state = 'reserved'                                  │
//! │                                                                         │
//! │  rows_affected = 1  → this caller won the transition                   │
//! │  rows_affected = 0  → someone else moved the sale first (or it never   │
//! │                       was in the expected state); nothing changed      │
//! │                                                                         │
//! │  Two concurrent confirm_pickup calls: exactly one sees 1.              │
//! │  Two concurrent sweeps: each sale is claimed by exactly one.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `mark_*` statements also keep the field invariants: `pickup_code` is
//! only present on paid and completed sales, `expires_at` only on paid ones.

use chrono::{DateTime, Utc};
use sqlx::{Executor, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use vendo_core::{Sale, SaleState};

const SALE_COLUMNS: &str = r#"
    id, slot_id, product_id, quantity, unit_price_cents, total_price_cents,
    state, pickup_code, payment_id, created_at, updated_at,
    reserved_at, paid_at, expires_at, picked_up_at,
    cancelled_at, cancel_reason, expired_at
"#;

/// Repository for sale database operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets a sale by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        Self::fetch(&self.pool, id).await
    }

    pub async fn fetch<'c, E>(executor: E, id: &str) -> DbResult<Option<Sale>>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let sql = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1");
        let sale = sqlx::query_as::<_, Sale>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(sale)
    }

    /// Paid sales whose pickup deadline is strictly before `now`, oldest
    /// deadline first.
    ///
    /// Timestamps are stored as RFC 3339 UTC text, which sorts
    /// chronologically, so the comparison happens in SQL.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> DbResult<Vec<Sale>> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE state = 'paid' AND expires_at < ?1 \
             ORDER BY expires_at, id"
        );
        let sales = sqlx::query_as::<_, Sale>(&sql)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(sales)
    }

    /// Whether an open (paid) sale already holds `code`.
    pub async fn pickup_code_in_use(&self, code: &str) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sales WHERE state = 'paid' AND pickup_code = ?1",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Inserts a new sale.
    pub async fn insert(&self, sale: &Sale) -> DbResult<()> {
        debug!(id = %sale.id, slot_id = %sale.slot_id, state = %sale.state, "Inserting sale");

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, slot_id, product_id, quantity, unit_price_cents, total_price_cents,
                state, pickup_code, payment_id, created_at, updated_at,
                reserved_at, paid_at, expires_at, picked_up_at,
                cancelled_at, cancel_reason, expired_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9, ?10, ?11,
                ?12, ?13, ?14, ?15,
                ?16, ?17, ?18
            )
            "#,
        )
        .bind(&sale.id)
        .bind(&sale.slot_id)
        .bind(&sale.product_id)
        .bind(sale.quantity)
        .bind(sale.unit_price_cents)
        .bind(sale.total_price_cents)
        .bind(sale.state)
        .bind(&sale.pickup_code)
        .bind(&sale.payment_id)
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .bind(sale.reserved_at)
        .bind(sale.paid_at)
        .bind(sale.expires_at)
        .bind(sale.picked_up_at)
        .bind(sale.cancelled_at)
        .bind(&sale.cancel_reason)
        .bind(sale.expired_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// `draft → reserved`. Returns whether this call made the transition.
    pub async fn mark_reserved<'c, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<bool>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET state = 'reserved', reserved_at = ?2, updated_at = ?2
            WHERE id = ?1 AND state = 'draft'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `reserved → paid`, issuing `pickup_code` with deadline `expires_at`.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - another paid sale holds the code
    pub async fn mark_paid<'c, E>(
        executor: E,
        id: &str,
        payment_id: &str,
        pickup_code: &str,
        paid_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> DbResult<bool>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET state = 'paid',
                payment_id = ?2,
                pickup_code = ?3,
                paid_at = ?4,
                expires_at = ?5,
                updated_at = ?4
            WHERE id = ?1 AND state = 'reserved'
            "#,
        )
        .bind(id)
        .bind(payment_id)
        .bind(pickup_code)
        .bind(paid_at)
        .bind(expires_at)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `paid → completed`, only if `pickup_code` still matches. The code is
    /// kept as proof of pickup; the deadline is cleared.
    pub async fn mark_completed<'c, E>(
        executor: E,
        id: &str,
        pickup_code: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET state = 'completed',
                picked_up_at = ?3,
                expires_at = NULL,
                updated_at = ?3
            WHERE id = ?1 AND state = 'paid' AND pickup_code = ?2
            "#,
        )
        .bind(id)
        .bind(pickup_code)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `expected → cancelled`. Clears any issued code and deadline.
    pub async fn mark_cancelled<'c, E>(
        executor: E,
        id: &str,
        expected: SaleState,
        reason: &str,
        now: DateTime<Utc>,
    ) -> DbResult<bool>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET state = 'cancelled',
                cancelled_at = ?3,
                cancel_reason = ?4,
                pickup_code = NULL,
                expires_at = NULL,
                updated_at = ?3
            WHERE id = ?1 AND state = ?2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(now)
        .bind(reason)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// `paid → expired`. Clears the code and deadline.
    pub async fn mark_expired<'c, E>(executor: E, id: &str, now: DateTime<Utc>) -> DbResult<bool>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE sales
            SET state = 'expired',
                expired_at = ?2,
                pickup_code = NULL,
                expires_at = NULL,
                updated_at = ?2
            WHERE id = ?1 AND state = 'paid'
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // =========================================================================
    // Archival
    // =========================================================================

    /// Moves terminal sales last touched before `cutoff` into
    /// `sales_archive` as JSON snapshots and deletes them from `sales`.
    ///
    /// ## Returns
    /// Number of sales archived.
    pub async fn archive_terminal(&self, cutoff: DateTime<Utc>) -> DbResult<u64> {
        let sql = format!(
            "SELECT {SALE_COLUMNS} FROM sales \
             WHERE state IN ('completed', 'cancelled', 'expired') AND updated_at < ?1"
        );
        let candidates: Vec<Sale> = sqlx::query_as::<_, Sale>(&sql)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        if candidates.is_empty() {
            return Ok(0);
        }

        let archived_at = Utc::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let mut archived = 0;
        for sale in &candidates {
            let payload = serde_json::to_string(sale)?;

            sqlx::query(
                "INSERT INTO sales_archive (id, state, payload, archived_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&sale.id)
            .bind(sale.state)
            .bind(payload)
            .bind(archived_at)
            .execute(&mut *tx)
            .await?;

            let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
                .bind(&sale.id)
                .execute(&mut *tx)
                .await?;
            archived += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(archived, cutoff = %cutoff, "Archived terminal sales");
        Ok(archived)
    }

    /// Reads an archived snapshot back.
    pub async fn get_archived(&self, id: &str) -> DbResult<Option<Sale>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM sales_archive WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(DbError::from))
            .transpose()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::generate_id;
    use crate::{Database, DbConfig};
    use chrono::{Duration, TimeZone};
    use vendo_core::{Machine, Slot};

    async fn setup() -> (Database, Sale) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let now = Utc::now();

        sqlx::query("INSERT INTO products (id, sku, name, active, created_at, updated_at) VALUES ('p', 'P-1', 'P', 1, ?1, ?1)")
            .bind(now)
            .execute(db.pool())
            .await
            .unwrap();

        let machine = Machine {
            id: generate_id(),
            name: "Lobby".into(),
            location_id: "loc-1".into(),
            service_point_id: None,
            active: true,
            created_at: now,
        };
        let slot = Slot {
            id: generate_id(),
            machine_id: machine.id.clone(),
            position: 1,
            product_id: Some("p".into()),
            capacity: 10,
            stock_available: 10,
            stock_reserved: 0,
            price_override_cents: Some(150),
            active: true,
            created_at: now,
            updated_at: now,
        };
        db.machines().provision(&machine, &[slot.clone()]).await.unwrap();

        let sale = Sale {
            id: generate_id(),
            slot_id: slot.id,
            product_id: "p".into(),
            quantity: 2,
            unit_price_cents: 150,
            total_price_cents: 300,
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
        db.sales().insert(&sale).await.unwrap();
        (db, sale)
    }

    #[tokio::test]
    async fn test_compare_and_set_only_wins_once() {
        let (db, sale) = setup().await;
        let now = Utc::now();

        assert!(SaleRepository::mark_reserved(db.pool(), &sale.id, now).await.unwrap());
        assert!(!SaleRepository::mark_reserved(db.pool(), &sale.id, now).await.unwrap());

        let expires = now + Duration::minutes(60);
        assert!(SaleRepository::mark_paid(db.pool(), &sale.id, "pay-1", "AB12CD", now, expires)
            .await
            .unwrap());
        assert!(db.sales().pickup_code_in_use("AB12CD").await.unwrap());

        assert!(!SaleRepository::mark_completed(db.pool(), &sale.id, "ZZZZZZ", now).await.unwrap());
        assert!(SaleRepository::mark_completed(db.pool(), &sale.id, "AB12CD", now).await.unwrap());
        assert!(!SaleRepository::mark_expired(db.pool(), &sale.id, now).await.unwrap());

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SaleState::Completed);
        assert_eq!(stored.pickup_code.as_deref(), Some("AB12CD"));
        assert!(stored.invariants_hold());
        assert!(!db.sales().pickup_code_in_use("AB12CD").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_pickup_codes_are_unique() {
        let (db, first) = setup().await;
        let now = Utc::now();
        let mut second = first.clone();
        second.id = generate_id();
        db.sales().insert(&second).await.unwrap();

        for id in [&first.id, &second.id] {
            SaleRepository::mark_reserved(db.pool(), id, now).await.unwrap();
        }
        let expires = now + Duration::minutes(5);
        SaleRepository::mark_paid(db.pool(), &first.id, "p1", "SAME01", now, expires)
            .await
            .unwrap();

        let err = SaleRepository::mark_paid(db.pool(), &second.id, "p2", "SAME01", now, expires)
            .await
            .unwrap_err();
        assert!(err.is_unique_violation_on("pickup_code"));
    }

    #[tokio::test]
    async fn test_cancel_clears_code() {
        let (db, sale) = setup().await;
        let now = Utc::now();
        SaleRepository::mark_reserved(db.pool(), &sale.id, now).await.unwrap();
        SaleRepository::mark_paid(db.pool(), &sale.id, "p", "QWERTY", now, now + Duration::minutes(1))
            .await
            .unwrap();

        assert!(!SaleRepository::mark_cancelled(db.pool(), &sale.id, SaleState::Reserved, "x", now)
            .await
            .unwrap());
        assert!(SaleRepository::mark_cancelled(db.pool(), &sale.id, SaleState::Paid, "changed mind", now)
            .await
            .unwrap());

        let stored = db.sales().get_by_id(&sale.id).await.unwrap().unwrap();
        assert_eq!(stored.state, SaleState::Cancelled);
        assert_eq!(stored.pickup_code, None);
        assert_eq!(stored.expires_at, None);
        assert_eq!(stored.cancel_reason.as_deref(), Some("changed mind"));
    }

    #[tokio::test]
    async fn test_list_expired_filters_by_deadline_in_sql() {
        let (db, paid) = setup().await;
        let mut draft = paid.clone();
        draft.id = generate_id();
        db.sales().insert(&draft).await.unwrap();

        let paid_at = Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap();
        let deadline = paid_at + Duration::minutes(5) + Duration::milliseconds(500);
        SaleRepository::mark_reserved(db.pool(), &paid.id, paid_at).await.unwrap();
        SaleRepository::mark_paid(db.pool(), &paid.id, "p", "EXP001", paid_at, deadline)
            .await
            .unwrap();

        assert!(db.sales().list_expired(deadline - Duration::milliseconds(1)).await.unwrap().is_empty());
        assert!(db.sales().list_expired(deadline).await.unwrap().is_empty());

        let due = db.sales().list_expired(deadline + Duration::microseconds(1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, paid.id);

        let due = db.sales().list_expired(deadline + Duration::hours(1)).await.unwrap();
        assert_eq!(due.len(), 1);
    }

    #[tokio::test]
    async fn test_archive_moves_old_terminal_sales() {
        let (db, sale) = setup().await;
        let now = Utc::now();
        SaleRepository::mark_cancelled(db.pool(), &sale.id, SaleState::Draft, "test", now)
            .await
            .unwrap();

        assert_eq!(db.sales().archive_terminal(now - Duration::days(1)).await.unwrap(), 0);
        assert_eq!(db.sales().archive_terminal(now + Duration::seconds(1)).await.unwrap(), 1);

        assert!(db.sales().get_by_id(&sale.id).await.unwrap().is_none());
        let archived = db.sales().get_archived(&sale.id).await.unwrap().unwrap();
        assert_eq!(archived.state, SaleState::Cancelled);
    }
}

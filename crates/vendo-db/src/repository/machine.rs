//! # Machine Repository
//!
//! Machines and their slots. A machine is provisioned together with its
//! slots in one transaction, so a machine never exists half-equipped.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::repository::slot::SlotRepository;
use vendo_core::{Machine, Slot};

/// Repository for machine database operations.
#[derive(Debug, Clone)]
pub struct MachineRepository {
    pool: SqlitePool,
}

impl MachineRepository {
    pub fn new(pool: SqlitePool) -> Self {
        MachineRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Machine>> {
        let machine = sqlx::query_as::<_, Machine>(
            r#"
            SELECT id, name, location_id, service_point_id, active, created_at
            FROM machines
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(machine)
    }

    /// Machine that owns `slot_id`.
    pub async fn get_by_slot(&self, slot_id: &str) -> DbResult<Option<Machine>> {
        let machine = sqlx::query_as::<_, Machine>(
            r#"
            SELECT m.id, m.name, m.location_id, m.service_point_id, m.active, m.created_at
            FROM machines m
            JOIN slots s ON s.machine_id = m.id
            WHERE s.id = ?1
            "#,
        )
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(machine)
    }

    /// Inserts a machine and all of its slots atomically.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - two slots share a position
    pub async fn provision(&self, machine: &Machine, slots: &[Slot]) -> DbResult<()> {
        debug!(id = %machine.id, slots = slots.len(), "Provisioning machine");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO machines (id, name, location_id, service_point_id, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&machine.id)
        .bind(&machine.name)
        .bind(&machine.location_id)
        .bind(&machine.service_point_id)
        .bind(machine.active)
        .bind(machine.created_at)
        .execute(&mut *tx)
        .await?;

        for slot in slots {
            SlotRepository::insert(&mut *tx, slot).await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        info!(id = %machine.id, slots = slots.len(), "Machine provisioned");
        Ok(())
    }
}

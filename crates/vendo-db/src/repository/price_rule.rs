//! # Price Rule Repository
//!
//! Rules are append-only: they are inserted, closed (by setting
//! `valid_to`) or deleted, never edited in place. Resolution itself is a
//! pure function in `vendo_core::pricing`; this repository only loads the
//! candidates for one entity.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use vendo_core::PriceRule;

const RULE_COLUMNS: &str = r#"
    id, level, entity_type, entity_id, location_id, service_point_id,
    amount_cents, valid_from, valid_to, created_at
"#;

/// Repository for price rule database operations.
#[derive(Debug, Clone)]
pub struct PriceRuleRepository {
    pool: SqlitePool,
}

impl PriceRuleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PriceRuleRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<PriceRule>> {
        let sql = format!("SELECT {RULE_COLUMNS} FROM price_rules WHERE id = ?1");
        let rule = sqlx::query_as::<_, PriceRule>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(rule)
    }

    /// All rules, at every level and in every state of validity, for one
    /// priced entity.
    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> DbResult<Vec<PriceRule>> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM price_rules WHERE entity_type = ?1 AND entity_id = ?2"
        );
        let rules = sqlx::query_as::<_, PriceRule>(&sql)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(entity_type, entity_id, count = rules.len(), "Loaded price rules");
        Ok(rules)
    }

    pub async fn insert(&self, rule: &PriceRule) -> DbResult<PriceRule> {
        debug!(id = %rule.id, level = %rule.level, entity_id = %rule.entity_id, "Inserting price rule");

        sqlx::query(
            r#"
            INSERT INTO price_rules (
                id, level, entity_type, entity_id, location_id, service_point_id,
                amount_cents, valid_from, valid_to, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&rule.id)
        .bind(rule.level)
        .bind(&rule.entity_type)
        .bind(&rule.entity_id)
        .bind(&rule.location_id)
        .bind(&rule.service_point_id)
        .bind(rule.amount_cents)
        .bind(rule.valid_from)
        .bind(rule.valid_to)
        .bind(rule.created_at)
        .execute(&self.pool)
        .await?;

        Ok(rule.clone())
    }

    /// Ends a rule's validity on `valid_to` (inclusive).
    pub async fn close(&self, id: &str, valid_to: NaiveDate) -> DbResult<()> {
        let result = sqlx::query("UPDATE price_rules SET valid_to = ?2 WHERE id = ?1")
            .bind(id)
            .bind(valid_to)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PriceRule", id));
        }

        Ok(())
    }

    pub async fn delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Deleting price rule");

        let result = sqlx::query("DELETE FROM price_rules WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("PriceRule", id));
        }

        Ok(())
    }
}

//! # Price Resolver
//!
//! Loads the candidate rules for one entity and hands them to the pure
//! tiered lookup in [`vendo_core::pricing`]. Also the write path for rules,
//! so every stored rule has passed validation.

use std::sync::Arc;
use tracing::{debug, info, instrument};

use vendo_core::pricing::{resolve_price, validate_price_rule};
use vendo_core::{Clock, CoreError, CoreResult, Money, PriceContext, PriceResolution, PriceRule};
use vendo_db::Database;

use crate::error::StorageContext;

/// Hierarchical price lookup (SERVICE_POINT → LOCATION → BASE).
#[derive(Debug, Clone)]
pub struct PriceResolver {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl PriceResolver {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        PriceResolver { db, clock }
    }

    /// Resolves the active price of `(entity_type, entity_id)` in `context`
    /// as of the clock's current date. `None` if no tier has an active rule.
    #[instrument(skip(self, context))]
    pub async fn resolve(
        &self,
        entity_type: &str,
        entity_id: &str,
        context: &PriceContext,
    ) -> CoreResult<Option<PriceResolution>> {
        let rules = self
            .db
            .price_rules()
            .list_for_entity(entity_type, entity_id)
            .await
            .storage("load price rules")?;

        let resolution = resolve_price(&rules, entity_type, entity_id, context, self.clock.today());

        match &resolution {
            Some(hit) => debug!(level = %hit.level, rule_id = %hit.rule_id, amount = %hit.amount, "Price resolved"),
            None => debug!(candidates = rules.len(), "No active price rule"),
        }

        Ok(resolution)
    }

    /// Like [`resolve`](Self::resolve) but only the amount.
    pub async fn resolve_amount(
        &self,
        entity_type: &str,
        entity_id: &str,
        context: &PriceContext,
    ) -> CoreResult<Option<Money>> {
        Ok(self
            .resolve(entity_type, entity_id, context)
            .await?
            .map(|hit| hit.amount))
    }

    // =========================================================================
    // Rule Management
    // =========================================================================

    /// Validates and stores a rule.
    pub async fn add_rule(&self, rule: &PriceRule) -> CoreResult<PriceRule> {
        validate_price_rule(rule)?;

        let stored = self.db.price_rules().insert(rule).await.storage("insert price rule")?;
        info!(
            rule_id = %stored.id,
            level = %stored.level,
            entity_id = %stored.entity_id,
            amount = %stored.amount(),
            "Price rule added"
        );
        Ok(stored)
    }

    /// Ends a rule's validity after `valid_to` (inclusive).
    pub async fn close_rule(&self, rule_id: &str, valid_to: chrono::NaiveDate) -> CoreResult<()> {
        let rule = self
            .db
            .price_rules()
            .get_by_id(rule_id)
            .await
            .storage("load price rule")?
            .ok_or_else(|| CoreError::not_found("PriceRule", rule_id))?;

        if valid_to < rule.valid_from {
            return Err(CoreError::business_rule(format!(
                "price rule {} cannot end before it starts ({})",
                rule_id, rule.valid_from
            )));
        }

        self.db
            .price_rules()
            .close(rule_id, valid_to)
            .await
            .storage("close price rule")
    }

    pub async fn remove_rule(&self, rule_id: &str) -> CoreResult<()> {
        self.db
            .price_rules()
            .delete(rule_id)
            .await
            .storage("delete price rule")?;
        info!(rule_id = %rule_id, "Price rule removed");
        Ok(())
    }
}

//! # Price Resolution
//!
//! Picks the unit price for an entity from the three-tier rule hierarchy.
//!
//! ## Priority
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. SERVICE_POINT  rule for entity_id AND context.service_point_id     │
//! │          │ no active match                                              │
//! │          ▼                                                              │
//! │  2. LOCATION       rule for entity_id AND context.location_id          │
//! │          │ no active match                                              │
//! │          ▼                                                              │
//! │  3. BASE           rule for entity_id                                  │
//! │          │ no active match                                              │
//! │          ▼                                                              │
//! │     None                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! "Active" means `valid_from <= today <= valid_to|∞`. Within one tier, the
//! rule with the latest `valid_from` wins; equal starts fall back to the
//! larger id so the answer never depends on row order.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{PriceLevel, PriceRule};
use crate::validation::ValidationResult;

/// Most specific tier first.
pub const PRIORITY: [PriceLevel; 3] = [
    PriceLevel::ServicePoint,
    PriceLevel::Location,
    PriceLevel::Base,
];

/// Where the priced entity is being sold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceContext {
    pub location_id: Option<String>,
    pub service_point_id: Option<String>,
}

/// The winning rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceResolution {
    pub amount: Money,
    pub level: PriceLevel,
    pub rule_id: String,
}

/// Resolves the price of `(entity_type, entity_id)` in `context` on `today`.
///
/// `rules` may contain rules for other entities; they are ignored.
pub fn resolve_price(
    rules: &[PriceRule],
    entity_type: &str,
    entity_id: &str,
    context: &PriceContext,
    today: NaiveDate,
) -> Option<PriceResolution> {
    PRIORITY.iter().find_map(|&level| {
        rules
            .iter()
            .filter(|r| r.level == level)
            .filter(|r| r.entity_type == entity_type && r.entity_id == entity_id)
            .filter(|r| r.is_active_on(today))
            .filter(|r| matches_context(r, context))
            .max_by(|a, b| a.valid_from.cmp(&b.valid_from).then_with(|| a.id.cmp(&b.id)))
            .map(|r| PriceResolution {
                amount: r.amount(),
                level,
                rule_id: r.id.clone(),
            })
    })
}

fn matches_context(rule: &PriceRule, context: &PriceContext) -> bool {
    match rule.level {
        PriceLevel::Base => true,
        PriceLevel::Location => {
            rule.location_id.is_some() && rule.location_id == context.location_id
        }
        PriceLevel::ServicePoint => {
            rule.service_point_id.is_some() && rule.service_point_id == context.service_point_id
        }
    }
}

/// Checks a rule before it is stored.
pub fn validate_price_rule(rule: &PriceRule) -> ValidationResult<()> {
    if rule.entity_type.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "entity_type".to_string(),
        });
    }

    if rule.entity_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "entity_id".to_string(),
        });
    }

    match rule.level {
        PriceLevel::Location if rule.location_id.is_none() => {
            return Err(ValidationError::Required {
                field: "location_id".to_string(),
            });
        }
        PriceLevel::ServicePoint if rule.service_point_id.is_none() => {
            return Err(ValidationError::Required {
                field: "service_point_id".to_string(),
            });
        }
        _ => {}
    }

    crate::validation::validate_price_cents(rule.amount_cents)?;

    if let Some(to) = rule.valid_to {
        if to < rule.valid_from {
            return Err(ValidationError::InvalidFormat {
                field: "valid_to".to_string(),
                reason: "must not be before valid_from".to_string(),
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

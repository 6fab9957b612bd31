//! # Errors
//!
//! [`CoreError`] is the single taxonomy callers of the engine match on.
//! Storage failures are folded into it by `vendo-db`; configuration and
//! bootstrap failures live in `vendo-engine::EngineError` instead.
//!
//! ```text
//!  ValidationError ──#[from]──► CoreError ◄──From── DbError
//!                                   │
//!                                   ▼
//!                       code(): "NOT_FOUND", "EXPIRED", ...
//! ```
//!
//! Messages carry the ids and quantities involved. Collaborators should
//! branch on [`CoreError::code`], never on the text.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::lifecycle::SaleOperation;
use crate::types::SaleState;

// =============================================================================
// Core Error
// =============================================================================

/// Every failure a vendo operation can report.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Slot, sale, product or machine does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The ledger cannot cover the requested quantity.
    ///
    /// `available` is the count observed when the reservation was refused.
    #[error("Insufficient stock in slot {slot_id}: available {available}, requested {requested}")]
    InsufficientStock {
        slot_id: String,
        available: i64,
        requested: i64,
    },

    /// A business rule was violated (quantity over capacity, duplicate SKU,
    /// inactive slot, product not assigned to the slot, ...).
    #[error("Business rule violated: {0}")]
    BusinessRule(String),

    /// The operation is not legal from the sale's current state.
    #[error("Sale {sale_id} is {state}, cannot {operation}")]
    InvalidStateTransition {
        sale_id: String,
        state: SaleState,
        operation: SaleOperation,
    },

    /// The pickup code is well-formed but does not match.
    #[error("Invalid pickup code for sale {sale_id}")]
    InvalidPickupCode { sale_id: String },

    /// The pickup window closed before the code was presented.
    #[error("Sale {sale_id} expired at {expires_at}")]
    PickupExpired {
        sale_id: String,
        expires_at: DateTime<Utc>,
    },

    /// Unexpected lower-layer failure (storage, pool, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn business_rule(message: impl Into<String>) -> Self {
        CoreError::BusinessRule(message.into())
    }

    /// Stable machine-readable code for the error category.
    ///
    /// Collaborators (an HTTP layer, a kiosk UI) map on this instead of
    /// matching message text.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            CoreError::BusinessRule(_) => "BUSINESS_RULE",
            CoreError::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
            CoreError::InvalidPickupCode { .. } => "INVALID_PICKUP_CODE",
            CoreError::PickupExpired { .. } => "EXPIRED",
            CoreError::Internal(_) => "INTERNAL",
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Malformed input. Raised before the ledger or the sale table is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Zero or negative quantities.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Not a UUID, or a pickup code that is not six `[A-Z0-9]` characters.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

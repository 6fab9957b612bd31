//! # Input Checks
//!
//! Pure predicates run by the engine before it opens a connection. A
//! request that fails here never touches a slot's counters.
//!
//! | Input | Rule |
//! |-------|------|
//! | slot, sale, product ids | UUID text |
//! | quantity | `1..=MAX_SLOT_CAPACITY` |
//! | initial stock | `0..=capacity` |
//! | price | non-negative cents |
//! | payment TTL | `1..=MAX_PAYMENT_TTL_MINUTES` |
//! | SKU, names, reasons | trimmed, non-empty, bounded length |
//!
//! The schema repeats the stock and price bounds as CHECK constraints, so a
//! row that slips past these functions still cannot be stored.

use crate::error::ValidationError;
use crate::{MAX_PAYMENT_TTL_MINUTES, MAX_SLOT_CAPACITY};

pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted cancellation reason.
pub const MAX_REASON_LENGTH: usize = 500;

/// Longest accepted payment reference.
pub const MAX_PAYMENT_ID_LENGTH: usize = 128;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ```rust
/// use vendo_core::validation::validate_sku;
///
/// assert!(validate_sku("COLA-330").is_ok());
/// assert!(validate_sku("").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a free-text field that must be present and bounded.
pub fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(())
}

/// Validates a cancellation reason.
pub fn validate_cancel_reason(reason: &str) -> ValidationResult<()> {
    validate_text("reason", reason, MAX_REASON_LENGTH)
}

/// Validates an opaque payment-gateway reference.
pub fn validate_payment_id(payment_id: &str) -> ValidationResult<()> {
    validate_text("payment_id", payment_id, MAX_PAYMENT_ID_LENGTH)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity for reserve/release/consume and sale creation.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_SLOT_CAPACITY; the per-slot capacity check is a
///   business rule applied later
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_SLOT_CAPACITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_SLOT_CAPACITY,
        });
    }

    Ok(())
}

/// Validates a slot capacity at provisioning time.
pub fn validate_capacity(capacity: i64) -> ValidationResult<()> {
    if !(1..=MAX_SLOT_CAPACITY).contains(&capacity) {
        return Err(ValidationError::OutOfRange {
            field: "capacity".to_string(),
            min: 1,
            max: MAX_SLOT_CAPACITY,
        });
    }

    Ok(())
}

/// Validates the stock loaded into a slot. Zero is allowed (empty slot).
pub fn validate_initial_stock(stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::OutOfRange {
            field: "initial_stock".to_string(),
            min: 0,
            max: MAX_SLOT_CAPACITY,
        });
    }

    Ok(())
}

/// Validates a price in cents.
///
/// ```rust
/// use vendo_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(300).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment TTL in minutes.
pub fn validate_ttl_minutes(ttl: i64) -> ValidationResult<()> {
    if !(1..=MAX_PAYMENT_TTL_MINUTES).contains(&ttl) {
        return Err(ValidationError::OutOfRange {
            field: "ttl_minutes".to_string(),
            min: 1,
            max: MAX_PAYMENT_TTL_MINUTES,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates that `id` is a UUID.
///
/// ```rust
/// use vendo_core::validation::validate_uuid;
///
/// assert!(validate_uuid("sale_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("sale_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

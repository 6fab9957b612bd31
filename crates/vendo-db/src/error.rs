//! # Storage Errors
//!
//! [`DbError`] sorts sqlx failures into the cases the engine reacts to
//! differently. Most of them only ever get logged; two are load-bearing:
//!
//! - `UniqueViolation` on `sales.pickup_code` makes confirm-payment draw a
//!   new code.
//! - `NotFound` surfaces unchanged as [`CoreError::NotFound`].
//!
//! ```text
//!  sqlx::Error ──► DbError ──► CoreError ──► CoreError::code() at the edge
//! ```

use sqlx::error::ErrorKind;
use thiserror::Error;
use vendo_core::CoreError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `field` is SQLite's `table.column` list, e.g. `sales.pickup_code`,
    /// `products.sku` or `slots.machine_id, slots.position`.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// A slot or sale pointing at a row that does not exist.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Stock counters or prices outside their column CHECKs. The ledger's
    /// conditional statements never produce these.
    #[error("Check constraint violation: {message}")]
    CheckViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No connection freed up within `connect_timeout`.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Archive snapshot could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for a UNIQUE violation on `column` (e.g. `"sales.pickup_code"`).
    pub fn is_unique_violation_on(&self, column: &str) -> bool {
        matches!(self, DbError::UniqueViolation { field, .. } if field.contains(column))
    }
}

/// Columns named in `UNIQUE constraint failed: sales.pickup_code`.
fn constraint_columns(message: &str) -> String {
    message
        .split_once(": ")
        .map(|(_, columns)| columns.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => {
                        DbError::duplicate(constraint_columns(&message), "unknown")
                    }
                    ErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    ErrorKind::CheckViolation => DbError::CheckViolation { message },
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Storage failures reach callers as domain errors.
///
/// ```text
/// NotFound                     → CoreError::NotFound
/// UniqueViolation              → CoreError::BusinessRule (duplicate)
/// ForeignKey / Check violation → CoreError::BusinessRule
/// everything else              → CoreError::Internal
/// ```
impl From<DbError> for CoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => CoreError::NotFound { entity, id },
            DbError::UniqueViolation { field, .. } => {
                CoreError::BusinessRule(format!("duplicate {field}"))
            }
            DbError::ForeignKeyViolation { message } | DbError::CheckViolation { message } => {
                CoreError::BusinessRule(message)
            }
            other => CoreError::Internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_error_to_core_error() {
        let core: CoreError = DbError::not_found("Sale", "s-1").into();
        assert!(matches!(core, CoreError::NotFound { ref entity, .. } if entity == "Sale"));

        let core: CoreError = DbError::duplicate("products.sku", "COLA").into();
        assert_eq!(core.code(), "BUSINESS_RULE");

        let core: CoreError = DbError::PoolExhausted.into();
        assert_eq!(core.code(), "INTERNAL");
    }

    #[test]
    fn test_constraint_columns() {
        assert_eq!(
            constraint_columns("UNIQUE constraint failed: sales.pickup_code"),
            "sales.pickup_code"
        );
        assert_eq!(constraint_columns("no detail"), "unknown");
    }

    #[test]
    fn test_unique_violation_column_match() {
        let err = DbError::duplicate("sales.pickup_code", "unknown");
        assert!(err.is_unique_violation_on("pickup_code"));
        assert!(!err.is_unique_violation_on("sku"));
        assert!(!DbError::PoolExhausted.is_unique_violation_on("pickup_code"));
    }
}

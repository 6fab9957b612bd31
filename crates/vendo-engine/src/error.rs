//! # Engine Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Domain      │  │      Runner             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Core(CoreError)│  │  ChannelError           │ │
//! │  │  ConfigLoad     │  │  Database(DbErr)│  │  ShuttingDown           │ │
//! │  │  ConfigSave     │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sale and ledger operations return [`CoreResult`](vendo_core::CoreResult)
//! so collaborators see the domain taxonomy directly. `EngineError` is for
//! bootstrap and the background runner.

use thiserror::Error;
use tracing::error;
use vendo_core::{CoreError, CoreResult};
use vendo_db::{DbError, DbResult};

/// Result type alias for engine bootstrap operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Domain and Storage Errors
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Runner Errors
    // =========================================================================
    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("Sweeper is shutting down")]
    ShuttingDown,
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::ConfigSaveFailed(err.to_string())
    }
}

impl EngineError {
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::ConfigLoadFailed(_)
                | EngineError::ConfigSaveFailed(_)
        )
    }
}

// =============================================================================
// Storage Context
// =============================================================================

/// Converts a storage result into the domain taxonomy, logging real storage
/// failures inside the caller's span (which carries `sale_id`/`slot_id`).
pub(crate) trait StorageContext<T> {
    fn storage(self, operation: &'static str) -> CoreResult<T>;
}

impl<T> StorageContext<T> for DbResult<T> {
    fn storage(self, operation: &'static str) -> CoreResult<T> {
        self.map_err(|err| {
            if !matches!(err, DbError::NotFound { .. }) {
                error!(error = %err, operation, "Storage failure");
            }
            CoreError::from(err)
        })
    }
}

impl<T> StorageContext<T> for Result<T, sqlx::Error> {
    fn storage(self, operation: &'static str) -> CoreResult<T> {
        self.map_err(DbError::from).storage(operation)
    }
}

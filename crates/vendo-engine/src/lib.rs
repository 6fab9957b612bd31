//! # vendo-engine: Sales Engine for Vendo
//!
//! Orchestrates stock, prices and sales for vending machine slots on top of
//! the pure rules in `vendo-core` and the repositories in `vendo-db`.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           vendo-engine                                  │
//! │                                                                         │
//! │  ┌───────────────────────────────────────────────────────────────────┐ │
//! │  │                            Engine                                 │ │
//! │  └──────┬──────────────────┬──────────────────┬──────────────────────┘ │
//! │         │                  │                  │                        │
//! │  ┌──────▼──────┐    ┌──────▼──────┐    ┌──────▼──────────────────────┐ │
//! │  │SaleLifecycle│───►│SlotStock-   │◄───│ ExpirationSweeper           │ │
//! │  │             │    │Ledger       │    │  └─ SweeperRunner (tokio)   │ │
//! │  └─────────────┘    └──────┬──────┘    └─────────────────────────────┘ │
//! │                            │                                            │
//! │                     ┌──────▼──────┐                                     │
//! │                     │PriceResolver│                                     │
//! │                     └─────────────┘                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`engine`] - `Engine` facade wiring the components together
//! - [`ledger`] - Slot counters: reserve, release, consume, assignment
//! - [`pricing`] - Tiered price lookup and rule management
//! - [`lifecycle`] - Sale state machine with transactional stock moves
//! - [`sweeper`] - Expiry reclamation, archival and the periodic runner
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Engine error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vendo_engine::{Engine, EngineConfig};
//!
//! let engine = Engine::connect(&EngineConfig::load_or_default(None)).await?;
//!
//! let sale = engine.lifecycle().create_sale(&slot_id, &product_id, 1).await?;
//! engine.lifecycle().reserve_stock(&sale.id).await?;
//! let paid = engine.lifecycle().confirm_payment(&sale.id, "pay_42", None).await?;
//! engine.lifecycle().confirm_pickup(&sale.id, &paid.pickup_code).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod pricing;
pub mod sweeper;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{DatabaseSettings, EngineConfig, LoggingSettings, SalesSettings, SweeperSettings};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use ledger::SlotStockLedger;
pub use lifecycle::SaleLifecycle;
pub use pricing::PriceResolver;
pub use sweeper::{ExpirationSweeper, SweeperHandle, SweeperRunner};

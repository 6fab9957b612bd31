//! # vendo-core: Pure Business Logic for Vendo
//!
//! This crate is the **heart** of Vendo. It holds the rules that decide
//! whether a slot can be sold from, what a unit costs and which sale
//! transitions are legal. Nothing in here touches a database or the wall
//! clock.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Vendo Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP / kiosk collaborators (external)              │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │   vendo-engine: SaleLifecycle, SlotStockLedger, Sweeper         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ vendo-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  pricing  │  │ lifecycle │  │  pickup   │  │   │
//! │  │   │   Slot    │  │ PriceRule │  │ SaleState │  │PickupCode │  │   │
//! │  │   │   Sale    │  │  tiers    │  │transitions│  │ generate  │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • CLOCK IS INJECTED        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    vendo-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain entities (Slot, Machine, PriceRule, Sale, outcomes)
//! - [`money`] - Money type with integer arithmetic
//! - [`error`] - Domain error taxonomy
//! - [`validation`] - Input validation
//! - [`pricing`] - BASE → LOCATION → SERVICE_POINT price resolution
//! - [`lifecycle`] - Sale state machine
//! - [`pickup`] - Pickup code generation and normalisation
//! - [`clock`] - Injectable time source
//!
//! ## Example Usage
//!
//! ```rust
//! use vendo_core::lifecycle::SaleOperation;
//! use vendo_core::SaleState;
//!
//! let next = SaleState::Draft.apply(SaleOperation::Reserve);
//! assert_eq!(next, Some(SaleState::Reserved));
//!
//! // No back-edges
//! assert_eq!(SaleState::Paid.apply(SaleOperation::Reserve), None);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod money;
pub mod pickup;
pub mod pricing;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{CoreError, CoreResult, ValidationError};
pub use lifecycle::SaleOperation;
pub use money::Money;
pub use pickup::PickupCode;
pub use pricing::{PriceContext, PriceResolution};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Minutes a paid sale stays collectable when the caller gives no TTL.
pub const DEFAULT_PAYMENT_TTL_MINUTES: i64 = 60;

/// Upper bound for a payment TTL (one week).
pub const MAX_PAYMENT_TTL_MINUTES: i64 = 7 * 24 * 60;

/// Largest capacity a single dispensing slot may declare.
///
/// ## Business Reason
/// Physical spirals and trays hold tens of units, not thousands. A larger
/// number is almost certainly a typo at provisioning time.
pub const MAX_SLOT_CAPACITY: i64 = 999;

/// Entity type used by price rules that target a product.
pub const PRODUCT_ENTITY_TYPE: &str = "PRODUCT";

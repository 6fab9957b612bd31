//! # Repository Module
//!
//! Database repository implementations for Vendo.
//!
//! ## Two Kinds of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads and one-off writes          Statements that join a transaction  │
//! │  ─────────────────────────         ───────────────────────────────────  │
//! │  db.slots().get_by_id(id)          SlotRepository::reserve(&mut *tx,..)│
//! │  db.sales().list_expired(now)      SaleRepository::mark_paid(exec, ..) │
//! │       │                                  │                              │
//! │       │  &self, uses the pool            │  associated fn, generic     │
//! │       ▼                                  ▼  over the executor           │
//! │  SqlitePool                        &SqlitePool or &mut SqliteConnection │
//! │                                                                         │
//! │  The engine composes the second kind so a sale's state change and      │
//! │  its ledger movement commit together or not at all.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Product reference data
//! - [`MachineRepository`](machine::MachineRepository) - Machines and slot provisioning
//! - [`SlotRepository`](slot::SlotRepository) - Stock ledger statements
//! - [`PriceRuleRepository`](price_rule::PriceRuleRepository) - Tiered price rules
//! - [`SaleRepository`](sale::SaleRepository) - Sales and archival

use uuid::Uuid;

pub mod machine;
pub mod price_rule;
pub mod product;
pub mod sale;
pub mod slot;

/// Generates a new entity ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

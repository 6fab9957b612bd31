//! # Domain Types
//!
//! Core domain types used throughout Vendo.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Machine      │1─n│      Slot       │1─n│      Sale       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  location_id    │   │  capacity       │   │  quantity       │       │
//! │  │  service_point  │   │  available      │   │  state          │       │
//! │  └─────────────────┘   │  reserved       │   │  pickup_code    │       │
//! │                        │  price_override │   │  expires_at     │       │
//! │  ┌─────────────────┐   └─────────────────┘   └─────────────────┘       │
//! │  │   PriceRule     │                                                   │
//! │  │  ─────────────  │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  level (tier)   │   │   PriceLevel    │   │   SaleState     │       │
//! │  │  entity         │   │  Base           │   │  Draft → ...    │       │
//! │  │  valid_from/to  │   │  Location       │   │  (lifecycle.rs) │       │
//! │  └─────────────────┘   │  ServicePoint   │   └─────────────────┘       │
//! │                        └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity uses a UUID v4 string `id`. Money columns are `*_cents: i64`
//! with accessors returning [`Money`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;
use crate::pricing::PriceContext;

// =============================================================================
// Product
// =============================================================================

/// A product that can be loaded into slots.
///
/// Product management lives outside this system; this is the subset sale
/// creation and slot assignment validate against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Product {
    pub id: String,
    /// Stock Keeping Unit - business identifier, unique.
    pub sku: String,
    pub name: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Machine
// =============================================================================

/// A vending machine installed at a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Machine {
    pub id: String,
    pub name: String,
    /// Location the machine is installed at.
    pub location_id: String,
    /// Service point within the location, when the site has several.
    pub service_point_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Machine {
    /// The pricing context slots of this machine resolve prices against.
    pub fn price_context(&self) -> PriceContext {
        PriceContext {
            location_id: Some(self.location_id.clone()),
            service_point_id: self.service_point_id.clone(),
        }
    }
}

// =============================================================================
// Slot
// =============================================================================

/// An addressable dispensing position in a machine.
///
/// ## Stock Accounting
/// ```text
/// ┌───────────────────────────── capacity ─────────────────────────────┐
/// │  stock_available  │  stock_reserved  │        empty space          │
/// └───────────────────┴──────────────────┴─────────────────────────────┘
///   reserve: available → reserved
///   release: reserved → available
///   consume: reserved → (gone, dispensed)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Slot {
    pub id: String,
    pub machine_id: String,
    /// 1-based position within the machine.
    pub position: i64,
    pub product_id: Option<String>,
    pub capacity: i64,
    pub stock_available: i64,
    pub stock_reserved: i64,
    /// Resolved unit price at assignment time.
    pub price_override_cents: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Returns the resolved unit price, if any.
    #[inline]
    pub fn price_override(&self) -> Option<Money> {
        self.price_override_cents.map(Money::from_cents)
    }

    /// `available + reserved <= capacity`, both non-negative.
    pub fn invariant_holds(&self) -> bool {
        self.stock_available >= 0
            && self.stock_reserved >= 0
            && self.stock_available + self.stock_reserved <= self.capacity
    }

    pub fn stock_levels(&self) -> StockLevels {
        StockLevels {
            capacity: self.capacity,
            stock_available: self.stock_available,
            stock_reserved: self.stock_reserved,
        }
    }
}

/// Stock counters of a slot right after a ledger operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockLevels {
    pub capacity: i64,
    pub stock_available: i64,
    pub stock_reserved: i64,
}

// =============================================================================
// Price Rules
// =============================================================================

/// Pricing tier of a rule, from least to most specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceLevel {
    /// Applies everywhere the entity is sold.
    Base,
    /// Applies at one location.
    Location,
    /// Applies at one service point within a location.
    ServicePoint,
}

impl PriceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceLevel::Base => "BASE",
            PriceLevel::Location => "LOCATION",
            PriceLevel::ServicePoint => "SERVICE_POINT",
        }
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A price for an entity at one tier, valid for a date window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PriceRule {
    pub id: String,
    pub level: PriceLevel,
    /// What is being priced, e.g. "PRODUCT".
    pub entity_type: String,
    pub entity_id: String,
    /// Required for LOCATION rules.
    pub location_id: Option<String>,
    /// Required for SERVICE_POINT rules.
    pub service_point_id: Option<String>,
    pub amount_cents: i64,
    pub valid_from: NaiveDate,
    /// Inclusive; `None` means open-ended.
    pub valid_to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl PriceRule {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// `valid_from <= today <= valid_to|∞`
    pub fn is_active_on(&self, today: NaiveDate) -> bool {
        self.valid_from <= today && self.valid_to.map_or(true, |to| today <= to)
    }
}

// =============================================================================
// Sale State
// =============================================================================

/// The state of a sale. Transitions live in [`crate::lifecycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SaleState {
    /// Created, nothing held.
    Draft,
    /// Stock held in the slot ledger.
    Reserved,
    /// Payment confirmed, pickup code issued, clock running.
    Paid,
    /// Buyer collected the goods.
    Completed,
    /// Cancelled by the buyer or operator.
    Cancelled,
    /// Pickup window elapsed, stock reclaimed.
    Expired,
}

impl Default for SaleState {
    fn default() -> Self {
        SaleState::Draft
    }
}

impl SaleState {
    /// Column value as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleState::Draft => "draft",
            SaleState::Reserved => "reserved",
            SaleState::Paid => "paid",
            SaleState::Completed => "completed",
            SaleState::Cancelled => "cancelled",
            SaleState::Expired => "expired",
        }
    }
}

impl fmt::Display for SaleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A purchase of `quantity` units from one slot.
///
/// ## Field Invariants
/// - `pickup_code` is set iff `state ∈ {paid, completed}`
/// - `expires_at` is set iff `state = paid`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Sale {
    pub id: String,
    pub slot_id: String,
    pub product_id: String,
    pub quantity: i64,
    /// Unit price frozen at creation.
    pub unit_price_cents: i64,
    pub total_price_cents: i64,
    pub state: SaleState,
    pub pickup_code: Option<String>,
    /// Opaque reference from the payment gateway.
    pub payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub picked_up_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Sale {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn total_price(&self) -> Money {
        Money::from_cents(self.total_price_cents)
    }

    /// True once `now` has reached the pickup deadline of a paid sale.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.state == SaleState::Paid && self.expires_at.map_or(false, |at| now >= at)
    }

    /// Checks the pickup-code and deadline field invariants.
    pub fn invariants_hold(&self) -> bool {
        let code_ok = self.pickup_code.is_some()
            == matches!(self.state, SaleState::Paid | SaleState::Completed);
        let expiry_ok = self.expires_at.is_some() == (self.state == SaleState::Paid);
        code_ok && expiry_ok
    }
}

// =============================================================================
// Operation Outcomes
// =============================================================================
// Field names follow the wire contract collaborators already consume.

/// Result of `confirm_payment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub sale_id: String,
    pub state: SaleState,
    pub pickup_code: String,
    pub paid_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of `confirm_pickup`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickupConfirmation {
    pub sale_id: String,
    pub state: SaleState,
    pub picked_up_at: DateTime<Utc>,
}

/// Result of `cancel_sale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancellationOutcome {
    pub sale_id: String,
    pub state: SaleState,
    /// Whether reserved stock went back to the slot.
    #[serde(rename = "stock_liberado")]
    pub stock_released: bool,
}

/// Result of one sweeper run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Sales moved from paid to expired by this run.
    #[serde(rename = "ventas_expiradas")]
    pub expired_sales: u64,
    /// Units returned to slot availability by this run.
    #[serde(rename = "stock_liberado")]
    pub stock_released: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

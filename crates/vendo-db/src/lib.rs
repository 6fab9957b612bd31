//! # vendo-db
//!
//! SQLite persistence for the vendo engine: one pool, one repository per
//! table, and the embedded schema.
//!
//! ```text
//!  vendo-engine                      vendo-db
//!  ────────────                      ────────
//!  SlotStockLedger ─┐   ┌─► SlotRepository       reserve/release/consume:
//!  SaleLifecycle  ──┼──►│   SaleRepository       one conditional UPDATE each
//!  PriceResolver  ──┤   │   PriceRuleRepository
//!  Sweeper ─────────┘   └─► Product/Machine      sale moves: compare-and-set
//!                               │
//!                               ▼
//!                       Database (SqlitePool) ──► vendo.db
//! ```
//!
//! Repositories are thin: SQL in, rows out. Deciding whether a move is
//! allowed belongs to `vendo-core`; statements here only make the move
//! atomic. Statements the engine composes into a transaction are associated
//! functions generic over `sqlx::Executor`, so they run on the pool or on
//! `&mut *tx` alike.
//!
//! ```rust,ignore
//! use vendo_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("vendo.db")).await?;
//! let slots = db.slots().list_by_machine(&machine_id).await?;
//! ```

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::generate_id;
pub use repository::machine::MachineRepository;
pub use repository::price_rule::PriceRuleRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::slot::SlotRepository;

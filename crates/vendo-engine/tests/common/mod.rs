//! Shared fixture for engine integration tests: a database, a manual clock
//! and helpers that provision machines, slots and prices.
//!
//! [`fixture`] uses a private in-memory database with one connection.
//! [`file_fixture`] opens a WAL database file with several connections, so
//! concurrent calls really overlap inside SQLite.

#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;

use vendo_core::{
    Clock, ManualClock, Machine, PriceLevel, PriceRule, Product, Slot, PRODUCT_ENTITY_TYPE,
};
use vendo_db::{generate_id, Database, DbConfig};
use vendo_engine::{Engine, EngineConfig};

pub const LOCATION: &str = "loc-centro";
pub const SERVICE_POINT: &str = "sp-lobby";

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

pub fn rules_valid_from() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 1).unwrap()
}

pub struct Fixture {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    // Keeps the database file alive for file-backed fixtures.
    _dir: Option<TempDir>,
}

pub async fn fixture() -> Fixture {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    build(db, None)
}

pub async fn file_fixture(max_connections: u32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("vendo.db")).max_connections(max_connections);
    let db = Database::new(config).await.unwrap();
    build(db, Some(dir))
}

fn build(db: Database, dir: Option<TempDir>) -> Fixture {
    let clock = Arc::new(ManualClock::new(start_time()));
    let engine = Engine::new(EngineConfig::default(), db, clock.clone() as Arc<dyn Clock>);
    Fixture {
        engine,
        clock,
        _dir: dir,
    }
}

impl Fixture {
    pub fn db(&self) -> &Database {
        self.engine.database()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }

    pub async fn product(&self, sku: &str) -> Product {
        let now = self.clock.now();
        let product = Product {
            id: generate_id(),
            sku: sku.to_string(),
            name: format!("Product {}", sku),
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.db().products().insert(&product).await.unwrap()
    }

    /// A machine at [`LOCATION`] / [`SERVICE_POINT`] with one empty slot.
    pub async fn slot(&self, capacity: i64) -> Slot {
        let now = self.clock.now();
        let machine = Machine {
            id: generate_id(),
            name: "Lobby".to_string(),
            location_id: LOCATION.to_string(),
            service_point_id: Some(SERVICE_POINT.to_string()),
            active: true,
            created_at: now,
        };
        let slot = Slot {
            id: generate_id(),
            machine_id: machine.id.clone(),
            position: 1,
            product_id: None,
            capacity,
            stock_available: 0,
            stock_reserved: 0,
            price_override_cents: None,
            active: true,
            created_at: now,
            updated_at: now,
        };
        self.db().machines().provision(&machine, &[slot.clone()]).await.unwrap();
        slot
    }

    pub async fn rule(&self, product_id: &str, level: PriceLevel, amount_cents: i64) -> PriceRule {
        let rule = PriceRule {
            id: generate_id(),
            level,
            entity_type: PRODUCT_ENTITY_TYPE.to_string(),
            entity_id: product_id.to_string(),
            location_id: match level {
                PriceLevel::Base => None,
                _ => Some(LOCATION.to_string()),
            },
            service_point_id: match level {
                PriceLevel::ServicePoint => Some(SERVICE_POINT.to_string()),
                _ => None,
            },
            amount_cents,
            valid_from: rules_valid_from(),
            valid_to: None,
            created_at: self.clock.now(),
        };
        self.engine.prices().add_rule(&rule).await.unwrap()
    }

    /// A priced product loaded into a fresh slot.
    pub async fn stocked_slot(&self, capacity: i64, stock: i64, price_cents: i64) -> (Product, Slot) {
        let product = self.product(&format!("SKU-{}", &generate_id()[..8])).await;
        self.rule(&product.id, PriceLevel::Base, price_cents).await;
        let slot = self.slot(capacity).await;
        let slot = self
            .engine
            .ledger()
            .assign_product(&slot.id, &product.id, stock)
            .await
            .unwrap();
        (product, slot)
    }

    pub async fn slot_state(&self, slot_id: &str) -> Slot {
        self.engine.ledger().slot(slot_id).await.unwrap()
    }
}

//! # Seed Data Generator
//!
//! Populates a database with demo machines for local development.
//!
//! ## Usage
//! ```bash
//! # Three machines (default)
//! cargo run -p vendo-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p vendo-db --bin seed -- --machines 10 --db ./data/vendo.db
//! ```
//!
//! ## Generated Data
//! - One product per catalogue entry, SKU `{CATEGORY}-{NAME}`
//! - A BASE price rule for every product
//! - A LOCATION rule for drinks at the first location
//! - A SERVICE_POINT rule for coffee at the first machine's service point
//! - N machines with 12 slots each, every slot loaded and priced

use chrono::{NaiveDate, Utc};
use std::env;
use vendo_core::pricing::resolve_price;
use vendo_core::{Machine, PriceLevel, PriceRule, Product, Slot, PRODUCT_ENTITY_TYPE};
use vendo_db::{generate_id, Database, DbConfig};

/// Catalogue: (category, name, base price in cents)
const CATALOGUE: &[(&str, &str, i64)] = &[
    ("BEV", "Cola", 200),
    ("BEV", "Cola Zero", 200),
    ("BEV", "Orange Soda", 190),
    ("BEV", "Still Water", 120),
    ("BEV", "Sparkling Water", 140),
    ("BEV", "Iced Tea", 210),
    ("BEV", "Coffee", 250),
    ("SNK", "Salted Chips", 180),
    ("SNK", "Pretzels", 160),
    ("SNK", "Chocolate Bar", 150),
    ("SNK", "Granola Bar", 170),
    ("SNK", "Gummy Bears", 130),
];

const SLOTS_PER_MACHINE: usize = 12;
const SLOT_CAPACITY: i64 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut machines: usize = 3;
    let mut db_path = String::from("./vendo_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--machines" | "-m" => {
                if i + 1 < args.len() {
                    machines = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Vendo Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -m, --machines <N> Number of machines to provision (default: 3)");
                println!("  -d, --db <PATH>    Database file path (default: ./vendo_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("Vendo Seed Data Generator");
    println!("=========================");
    println!("Database: {}", db_path);
    println!("Machines: {}", machines);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.products().count().await?;
    if existing > 0 {
        println!("⚠ Database already has {} products", existing);
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let now = Utc::now();
    let valid_from = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(now.date_naive());

    // Products and BASE rules
    let mut products = Vec::with_capacity(CATALOGUE.len());
    for (category, name, base_cents) in CATALOGUE {
        let product = Product {
            id: generate_id(),
            sku: format!("{}-{}", category, name.replace(' ', "").to_uppercase()),
            name: name.to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        db.products().insert(&product).await?;
        db.price_rules()
            .insert(&rule(&product.id, PriceLevel::Base, None, None, *base_cents, valid_from))
            .await?;
        products.push((product, *category));
    }
    println!("✓ {} products with base prices", products.len());

    // Machines, slots and context rules
    for m in 0..machines {
        let machine = Machine {
            id: generate_id(),
            name: format!("Machine {:02}", m + 1),
            location_id: format!("loc-{}", m % 2 + 1),
            service_point_id: Some(format!("sp-{}", m + 1)),
            active: true,
            created_at: now,
        };

        if m == 0 {
            for (product, category) in &products {
                if *category == "BEV" {
                    let loc = rule(
                        &product.id,
                        PriceLevel::Location,
                        Some(machine.location_id.clone()),
                        None,
                        230,
                        valid_from,
                    );
                    db.price_rules().insert(&loc).await?;
                }
                if product.name == "Coffee" {
                    let sp = rule(
                        &product.id,
                        PriceLevel::ServicePoint,
                        Some(machine.location_id.clone()),
                        machine.service_point_id.clone(),
                        300,
                        valid_from,
                    );
                    db.price_rules().insert(&sp).await?;
                }
            }
        }

        let slots: Vec<Slot> = (0..SLOTS_PER_MACHINE)
            .map(|position| Slot {
                id: generate_id(),
                machine_id: machine.id.clone(),
                position: position as i64 + 1,
                product_id: None,
                capacity: SLOT_CAPACITY,
                stock_available: 0,
                stock_reserved: 0,
                price_override_cents: None,
                active: true,
                created_at: now,
                updated_at: now,
            })
            .collect();
        db.machines().provision(&machine, &slots).await?;

        let context = machine.price_context();
        for (slot, (product, _)) in slots.iter().zip(products.iter()) {
            let rules = db
                .price_rules()
                .list_for_entity(PRODUCT_ENTITY_TYPE, &product.id)
                .await?;
            let resolved = resolve_price(
                &rules,
                PRODUCT_ENTITY_TYPE,
                &product.id,
                &context,
                now.date_naive(),
            );
            db.slots()
                .assign_product(
                    &slot.id,
                    &product.id,
                    SLOT_CAPACITY,
                    resolved.map(|r| r.amount.cents()),
                    now,
                )
                .await?;
        }

        let loaded = db.slots().list_by_machine(&machine.id).await?;
        let priced = loaded
            .iter()
            .filter(|slot| slot.price_override_cents.is_some())
            .count();
        println!(
            "✓ {} provisioned with {} slots ({} priced)",
            machine.name,
            loaded.len(),
            priced
        );
    }

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

fn rule(
    product_id: &str,
    level: PriceLevel,
    location_id: Option<String>,
    service_point_id: Option<String>,
    amount_cents: i64,
    valid_from: NaiveDate,
) -> PriceRule {
    PriceRule {
        id: generate_id(),
        level,
        entity_type: PRODUCT_ENTITY_TYPE.to_string(),
        entity_id: product_id.to_string(),
        location_id,
        service_point_id,
        amount_cents,
        valid_from,
        valid_to: None,
        created_at: Utc::now(),
    }
}

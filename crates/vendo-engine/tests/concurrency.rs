//! Races on a file-backed database with several pooled connections, run on
//! the multi-threaded runtime so competing calls overlap inside SQLite.

mod common;

use chrono::Duration;
use common::{file_fixture, Fixture};
use tokio::task::JoinSet;
use vendo_core::{CoreError, SaleState};

const CONNECTIONS: u32 = 8;

/// A paid sale of `qty` units with a 5 minute pickup window.
async fn paid(fx: &Fixture, slot_id: &str, product_id: &str, qty: i64) -> (String, String) {
    let lifecycle = fx.engine.lifecycle();
    let sale = lifecycle.create_sale(slot_id, product_id, qty).await.unwrap();
    lifecycle.reserve_stock(&sale.id).await.unwrap();
    let paid = lifecycle
        .confirm_payment(&sale.id, "pay_race", Some(5))
        .await
        .unwrap();
    (sale.id, paid.pickup_code)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_reserves_never_oversell() {
    let fx = file_fixture(CONNECTIONS).await;
    let (_, slot) = fx.stocked_slot(10, 10, 150).await;

    let mut tasks = JoinSet::new();
    for _ in 0..25 {
        let engine = fx.engine.clone();
        let slot_id = slot.id.clone();
        tasks.spawn(async move { engine.ledger().reserve(&slot_id, 1).await });
    }

    let (mut ok, mut short) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(_) => ok += 1,
            Err(CoreError::InsufficientStock { requested: 1, .. }) => short += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((ok, short), (10, 15));

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (0, 10));
    assert!(slot.invariant_holds());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_sale_reservations_leave_losers_in_draft() {
    let fx = file_fixture(CONNECTIONS).await;
    let (product, slot) = fx.stocked_slot(10, 10, 150).await;

    let mut drafts = Vec::new();
    for _ in 0..12 {
        let sale = fx
            .engine
            .lifecycle()
            .create_sale(&slot.id, &product.id, 1)
            .await
            .unwrap();
        drafts.push(sale.id);
    }

    let mut tasks = JoinSet::new();
    for sale_id in drafts.clone() {
        let engine = fx.engine.clone();
        tasks.spawn(async move { engine.lifecycle().reserve_stock(&sale_id).await });
    }

    let (mut ok, mut short) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(sale) => {
                assert_eq!(sale.state, SaleState::Reserved);
                ok += 1;
            }
            Err(CoreError::InsufficientStock { .. }) => short += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((ok, short), (10, 2));

    let mut still_draft = 0;
    for sale_id in &drafts {
        if fx.engine.lifecycle().get(sale_id).await.unwrap().state == SaleState::Draft {
            still_draft += 1;
        }
    }
    assert_eq!(still_draft, 2);

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (0, 10));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_pickups_complete_once() {
    let fx = file_fixture(CONNECTIONS).await;
    let (product, slot) = fx.stocked_slot(10, 10, 150).await;
    let (sale_id, code) = paid(&fx, &slot.id, &product.id, 3).await;

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let engine = fx.engine.clone();
        let (sale_id, code) = (sale_id.clone(), code.clone());
        tasks.spawn(async move { engine.lifecycle().confirm_pickup(&sale_id, &code).await });
    }

    let (mut ok, mut lost) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        match joined.unwrap() {
            Ok(done) => {
                assert_eq!(done.state, SaleState::Completed);
                ok += 1;
            }
            Err(CoreError::InvalidStateTransition {
                state: SaleState::Completed,
                ..
            }) => lost += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!((ok, lost), (1, 3));

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (7, 0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_sweeps_release_each_sale_once() {
    let fx = file_fixture(CONNECTIONS).await;
    let (product, slot) = fx.stocked_slot(20, 20, 150).await;
    for qty in [1, 2, 3, 1, 2, 1] {
        paid(&fx, &slot.id, &product.id, qty).await;
    }
    fx.advance(Duration::minutes(6));

    let mut tasks = JoinSet::new();
    for _ in 0..3 {
        let engine = fx.engine.clone();
        tasks.spawn(async move { engine.sweeper().sweep_expired().await });
    }

    let (mut expired, mut released) = (0, 0);
    while let Some(joined) = tasks.join_next().await {
        let report = joined.unwrap().unwrap();
        expired += report.expired_sales;
        released += report.stock_released;
    }
    assert_eq!(expired, 6);
    assert_eq!(released, 10);

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (20, 0));
}

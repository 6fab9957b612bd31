//! Sale lifecycle: creation, reservation, payment, pickup and cancellation.

mod common;

use chrono::Duration;
use common::{fixture, Fixture};
use vendo_core::{CoreError, Money, PriceLevel, Sale, SaleOperation, SaleState, Slot};

async fn paid_sale(fx: &Fixture, qty: i64) -> (Slot, Sale, String) {
    let (product, slot) = fx.stocked_slot(10, 10, 150).await;
    let lifecycle = fx.engine.lifecycle();

    let sale = lifecycle.create_sale(&slot.id, &product.id, qty).await.unwrap();
    lifecycle.reserve_stock(&sale.id).await.unwrap();
    let paid = lifecycle
        .confirm_payment(&sale.id, "pay_0001", Some(60))
        .await
        .unwrap();
    let sale = lifecycle.get(&sale.id).await.unwrap();
    (slot, sale, paid.pickup_code)
}

#[tokio::test]
async fn test_purchase_issues_code_and_deadline() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(10, 10, 250).await;
    let lifecycle = fx.engine.lifecycle();

    let sale = lifecycle.create_sale(&slot.id, &product.id, 5).await.unwrap();
    assert_eq!(sale.state, SaleState::Draft);
    assert_eq!(sale.unit_price_cents, 250);
    assert_eq!(sale.total_price_cents, 1250);
    assert_eq!(fx.slot_state(&slot.id).await.stock_available, 10);

    let sale = lifecycle.reserve_stock(&sale.id).await.unwrap();
    assert_eq!(sale.state, SaleState::Reserved);
    assert!(sale.reserved_at.is_some());
    let held = fx.slot_state(&slot.id).await;
    assert_eq!((held.stock_available, held.stock_reserved), (5, 5));

    let paid = lifecycle
        .confirm_payment(&sale.id, "pay_7781", Some(60))
        .await
        .unwrap();
    assert_eq!(paid.state, SaleState::Paid);
    assert_eq!(paid.pickup_code.len(), 6);
    assert!(paid
        .pickup_code
        .bytes()
        .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
    assert_eq!(paid.expires_at, paid.paid_at + Duration::minutes(60));

    let stored = lifecycle.get(&sale.id).await.unwrap();
    assert_eq!(stored.pickup_code.as_deref(), Some(paid.pickup_code.as_str()));
    assert_eq!(stored.payment_id.as_deref(), Some("pay_7781"));
    assert!(stored.invariants_hold());
}

#[tokio::test]
async fn test_default_ttl_comes_from_settings() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(10, 10, 100).await;
    let lifecycle = fx.engine.lifecycle();

    let sale = lifecycle.create_sale(&slot.id, &product.id, 1).await.unwrap();
    lifecycle.reserve_stock(&sale.id).await.unwrap();
    let paid = lifecycle.confirm_payment(&sale.id, "pay_1", None).await.unwrap();

    let ttl = fx.engine.config().sales.payment_ttl_minutes;
    assert_eq!(paid.expires_at - paid.paid_at, Duration::minutes(ttl));
}

#[tokio::test]
async fn test_pickup_accepts_case_and_whitespace_variants() {
    let fx = fixture().await;
    let (slot, sale, code) = paid_sale(&fx, 2).await;

    let typed = format!("  {}\n", code.to_ascii_lowercase());
    let done = fx
        .engine
        .lifecycle()
        .confirm_pickup(&sale.id, &typed)
        .await
        .unwrap();
    assert_eq!(done.state, SaleState::Completed);
    assert_eq!(done.picked_up_at, common::start_time());

    let stored = fx.engine.lifecycle().get(&sale.id).await.unwrap();
    assert_eq!(stored.state, SaleState::Completed);
    assert_eq!(stored.expires_at, None);
    assert!(stored.invariants_hold());

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (8, 0));
}

#[tokio::test]
async fn test_wrong_code_does_not_mutate() {
    let fx = fixture().await;
    let (slot, sale, code) = paid_sale(&fx, 2).await;
    let wrong = if code == "AAAAAA" { "BBBBBB" } else { "AAAAAA" };

    let err = fx
        .engine
        .lifecycle()
        .confirm_pickup(&sale.id, wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidPickupCode { .. }));

    let malformed = fx
        .engine
        .lifecycle()
        .confirm_pickup(&sale.id, "AB-12")
        .await
        .unwrap_err();
    assert!(matches!(malformed, CoreError::Validation(_)));

    assert_eq!(fx.engine.lifecycle().get(&sale.id).await.unwrap(), sale);
    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (8, 2));
}

#[tokio::test]
async fn test_pickup_after_deadline_is_expired_not_invalid() {
    let fx = fixture().await;
    let (_, sale, code) = paid_sale(&fx, 1).await;

    fx.advance(Duration::minutes(60));

    let err = fx
        .engine
        .lifecycle()
        .confirm_pickup(&sale.id, &code)
        .await
        .unwrap_err();
    match err {
        CoreError::PickupExpired { expires_at, .. } => {
            assert_eq!(Some(expires_at), sale.expires_at);
        }
        other => panic!("expected PickupExpired, got {other:?}"),
    }

    assert_eq!(
        fx.engine.lifecycle().get(&sale.id).await.unwrap().state,
        SaleState::Paid
    );
}

#[tokio::test]
async fn test_states_only_move_forward() {
    let fx = fixture().await;
    let (_, sale, code) = paid_sale(&fx, 1).await;
    let lifecycle = fx.engine.lifecycle();

    let err = lifecycle.reserve_stock(&sale.id).await.unwrap_err();
    assert!(matches!(
        err,
        CoreError::InvalidStateTransition {
            state: SaleState::Paid,
            operation: SaleOperation::Reserve,
            ..
        }
    ));
    assert!(matches!(
        lifecycle.confirm_payment(&sale.id, "pay_2", None).await,
        Err(CoreError::InvalidStateTransition { .. })
    ));

    lifecycle.confirm_pickup(&sale.id, &code).await.unwrap();

    assert!(matches!(
        lifecycle.confirm_pickup(&sale.id, &code).await,
        Err(CoreError::InvalidStateTransition { state: SaleState::Completed, .. })
    ));
    assert!(matches!(
        lifecycle.cancel_sale(&sale.id, "too late").await,
        Err(CoreError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_payment_requires_reservation() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(10, 10, 100).await;
    let lifecycle = fx.engine.lifecycle();

    let sale = lifecycle.create_sale(&slot.id, &product.id, 1).await.unwrap();
    assert!(matches!(
        lifecycle.confirm_payment(&sale.id, "pay_3", None).await,
        Err(CoreError::InvalidStateTransition { state: SaleState::Draft, .. })
    ));
    assert!(matches!(
        lifecycle.confirm_pickup(&sale.id, "ABC123").await,
        Err(CoreError::InvalidStateTransition { .. })
    ));
}

#[tokio::test]
async fn test_concurrent_pickups_complete_once() {
    let fx = fixture().await;
    let (slot, sale, code) = paid_sale(&fx, 3).await;
    let lifecycle = fx.engine.lifecycle();

    let (a, b) = tokio::join!(
        lifecycle.confirm_pickup(&sale.id, &code),
        lifecycle.confirm_pickup(&sale.id, &code)
    );

    assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
    assert!([&a, &b]
        .iter()
        .any(|r| matches!(r, Err(CoreError::InvalidStateTransition { .. }))));

    let slot = fx.slot_state(&slot.id).await;
    assert_eq!((slot.stock_available, slot.stock_reserved), (7, 0));
}

#[tokio::test]
async fn test_cancel_releases_only_held_stock() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(10, 10, 100).await;
    let lifecycle = fx.engine.lifecycle();

    let draft = lifecycle.create_sale(&slot.id, &product.id, 2).await.unwrap();
    let outcome = lifecycle.cancel_sale(&draft.id, "changed mind").await.unwrap();
    assert_eq!(outcome.state, SaleState::Cancelled);
    assert!(!outcome.stock_released);

    let reserved = lifecycle.create_sale(&slot.id, &product.id, 3).await.unwrap();
    lifecycle.reserve_stock(&reserved.id).await.unwrap();
    let outcome = lifecycle.cancel_sale(&reserved.id, "payment declined").await.unwrap();
    assert!(outcome.stock_released);

    let slot_now = fx.slot_state(&slot.id).await;
    assert_eq!((slot_now.stock_available, slot_now.stock_reserved), (10, 0));

    let stored = lifecycle.get(&reserved.id).await.unwrap();
    assert_eq!(stored.cancel_reason.as_deref(), Some("payment declined"));
    assert!(stored.cancelled_at.is_some());
}

#[tokio::test]
async fn test_cancel_paid_sale_clears_code() {
    let fx = fixture().await;
    let (slot, sale, code) = paid_sale(&fx, 4).await;
    let lifecycle = fx.engine.lifecycle();

    let outcome = lifecycle.cancel_sale(&sale.id, "machine jammed").await.unwrap();
    assert!(outcome.stock_released);

    let stored = lifecycle.get(&sale.id).await.unwrap();
    assert_eq!(stored.state, SaleState::Cancelled);
    assert_eq!(stored.pickup_code, None);
    assert_eq!(stored.expires_at, None);
    assert!(stored.invariants_hold());

    assert!(matches!(
        lifecycle.confirm_pickup(&sale.id, &code).await,
        Err(CoreError::InvalidStateTransition { .. })
    ));
    assert_eq!(fx.slot_state(&slot.id).await.stock_available, 10);
}

#[tokio::test]
async fn test_create_rejects_bad_requests() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(4, 4, 100).await;
    let other = fx.product("OTHER-1").await;
    let lifecycle = fx.engine.lifecycle();

    assert!(matches!(
        lifecycle.create_sale(&slot.id, &product.id, 5).await,
        Err(CoreError::BusinessRule(_))
    ));
    assert!(matches!(
        lifecycle.create_sale(&slot.id, &other.id, 1).await,
        Err(CoreError::BusinessRule(_))
    ));
    assert!(matches!(
        lifecycle
            .create_sale(&vendo_db::generate_id(), &product.id, 1)
            .await,
        Err(CoreError::NotFound { .. })
    ));
    assert!(matches!(
        lifecycle.create_sale(&slot.id, &product.id, 0).await,
        Err(CoreError::Validation(_))
    ));

    fx.engine.ledger().set_active(&slot.id, false).await.unwrap();
    assert!(matches!(
        lifecycle.create_sale(&slot.id, &product.id, 1).await,
        Err(CoreError::BusinessRule(_))
    ));
}

#[tokio::test]
async fn test_unpriced_slot_uses_fallback() {
    let fx = fixture().await;
    let product = fx.product("LOOSE-1").await;
    let slot = fx.slot(10).await;
    fx.engine
        .ledger()
        .assign_product(&slot.id, &product.id, 5)
        .await
        .unwrap();
    let lifecycle = fx.engine.lifecycle();

    assert!(matches!(
        lifecycle.create_sale(&slot.id, &product.id, 1).await,
        Err(CoreError::BusinessRule(_))
    ));

    let sale = lifecycle
        .create_sale_with_fallback(&slot.id, &product.id, 3, Some(Money::from_cents(120)))
        .await
        .unwrap();
    assert_eq!(sale.unit_price_cents, 120);
    assert_eq!(sale.total_price_cents, 360);
}

#[tokio::test]
async fn test_override_beats_fallback() {
    let fx = fixture().await;
    let product = fx.product("CHIPS-1").await;
    fx.rule(&product.id, PriceLevel::Location, 180).await;
    let slot = fx.slot(10).await;
    fx.engine
        .ledger()
        .assign_product(&slot.id, &product.id, 5)
        .await
        .unwrap();

    let sale = fx
        .engine
        .lifecycle()
        .create_sale_with_fallback(&slot.id, &product.id, 1, Some(Money::from_cents(999)))
        .await
        .unwrap();
    assert_eq!(sale.unit_price_cents, 180);
}

#[tokio::test]
async fn test_reserve_without_stock_keeps_draft() {
    let fx = fixture().await;
    let (product, slot) = fx.stocked_slot(10, 2, 100).await;
    let lifecycle = fx.engine.lifecycle();

    let sale = lifecycle.create_sale(&slot.id, &product.id, 3).await.unwrap();
    assert!(matches!(
        lifecycle.reserve_stock(&sale.id).await,
        Err(CoreError::InsufficientStock { .. })
    ));
    assert_eq!(lifecycle.get(&sale.id).await.unwrap().state, SaleState::Draft);
}

//! Integration tests for cart aggregates.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use rust_decimal::Decimal;
use shopez_cart::store::MemoryCartStore;
use shopez_cart::{CartTotals, CartView};
use shopez_core::{CurrencyCode, PendingOperation, ProductId};
use shopez_integration_tests::{TestContext, product, raw_record, user};

#[tokio::test]
async fn test_example_scenario() {
    let ctx = TestContext::new().await;
    let a = ProductId::new("A");
    let usd = CurrencyCode::USD;

    ctx.engine.add(product("A", 999), 2).await.unwrap();
    ctx.quantity_becomes("A", Some(2)).await;
    let view = ctx.engine.view();
    assert_eq!(view.lines()[0].display_subtotal(usd), "$19.98");

    ctx.engine.add(product("A", 999), 3).await.unwrap();
    ctx.quantity_becomes("A", Some(5)).await;
    let view = ctx.engine.view();
    assert_eq!(view.lines()[0].subtotal, Decimal::new(4995, 2));

    ctx.engine.set_quantity(&a, 1).await.unwrap();
    ctx.quantity_becomes("A", Some(1)).await;
    let view = ctx.engine.view();
    assert_eq!(view.lines()[0].display_subtotal(usd), "$9.99");

    ctx.engine.set_quantity(&a, 0).await.unwrap();
    ctx.quantity_becomes("A", None).await;
    let view = ctx.engine.view();
    assert_eq!(view, CartView::Empty);
    assert_eq!(view.totals().item_count, 0);
    assert_eq!(view.totals().display_price(usd), "$0.00");
}

#[tokio::test]
async fn test_aggregates_exact_for_a_thousand_lines() {
    let store = Arc::new(MemoryCartStore::new());
    let mut expected_count = 0_u64;
    let mut expected_total = Decimal::ZERO;

    for id in 1..=1000_u64 {
        let quantity = (id % 7) + 1;
        let record = raw_record(id, 0.1, i64::try_from(quantity).unwrap());
        store.insert_raw(&user(), id.to_string(), record);
        expected_count += quantity;
        expected_total += Decimal::new(1, 1) * Decimal::from(quantity);
    }

    let ctx = TestContext::with_store(store).await;
    let totals = ctx.engine.view().totals();

    assert_eq!(ctx.engine.view().lines().len(), 1000);
    assert_eq!(
        totals,
        CartTotals {
            item_count: expected_count,
            total_price: expected_total,
        }
    );
}

#[tokio::test]
async fn test_view_marks_busy_lines() {
    let ctx = Arc::new(TestContext::new().await);
    let a = ProductId::new("A");
    ctx.engine.add(product("A", 999), 1).await.unwrap();
    ctx.quantity_becomes("A", Some(1)).await;

    ctx.store.pause_writes();
    let remove = tokio::spawn({
        let ctx = Arc::clone(&ctx);
        async move { ctx.engine.remove(&ProductId::new("A")).await }
    });
    ctx.engine
        .subscribe_pending()
        .wait_for(|t| t.contains_key(&a))
        .await
        .unwrap();

    let view = ctx.engine.view();
    assert_eq!(view.lines()[0].pending, Some(PendingOperation::Removing));
    assert!(view.lines()[0].is_busy());

    ctx.store.resume_writes();
    remove.await.unwrap().unwrap();
    ctx.quantity_becomes("A", None).await;
    assert!(ctx.engine.view().is_empty());
}

#[tokio::test]
async fn test_overflowing_record_is_dropped_not_rendered() {
    let store = Arc::new(MemoryCartStore::new());
    store.insert_raw(&user(), "1", raw_record(1, 1e25, 100_000));
    store.insert_raw(&user(), "2", raw_record(2, 4.5, 2));

    let ctx = TestContext::with_store(store).await;
    let state = ctx.engine.state();
    assert_eq!(state.diagnostics.len(), 1);
    assert_eq!(state.diagnostics[0].key, "1");

    let view = ctx.engine.view();
    assert_eq!(view.lines().len(), 1);
    assert_eq!(view.totals().total_price, Decimal::new(900, 2));
}

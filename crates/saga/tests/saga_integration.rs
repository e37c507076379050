//! Integration tests for the order-creation saga.

use std::sync::Arc;
use std::time::Duration;

use cache::InMemoryCache;
use common::{PageRequest, ProductId, UserId};
use domain::{Money, Order, OrderStatus};
use order_store::{InMemoryOrderStore, OrderStore};
use orders::OrderService;
use saga::clients::{Call, InMemoryInventory, InMemoryPayments, InMemoryProductCatalog};
use saga::{
    Backoff, ClientError, CreateOrder, LineRequest, OrderSaga, RequestContext, RetryPolicy,
    SagaClients, SagaConfig, SagaError, SagaStep,
};

struct TestHarness {
    saga: OrderSaga,
    catalog: InMemoryProductCatalog,
    inventory: InMemoryInventory,
    payments: InMemoryPayments,
    store: InMemoryOrderStore,
    orders: OrderService,
}

fn fast_config() -> SagaConfig {
    SagaConfig {
        product_retry: RetryPolicy {
            max_attempts: 3,
            backoff: Backoff::None,
        },
        ..Default::default()
    }
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_config(fast_config()).await
    }

    async fn with_config(config: SagaConfig) -> Self {
        let catalog = InMemoryProductCatalog::new();
        catalog.add_product("P1", Money::from_minor(1000, 2), 5).await;
        catalog.add_product("P2", Money::from_minor(2550, 2), 10).await;
        catalog.add_product("P3", Money::from_minor(300, 2), 100).await;

        let inventory = InMemoryInventory::new();
        let payments = InMemoryPayments::new();
        let store = InMemoryOrderStore::new();
        let cache = InMemoryCache::new();

        let saga = OrderSaga::new(
            SagaClients {
                products: Box::new(catalog.clone()),
                inventory: Box::new(inventory.clone()),
                payments: Box::new(payments.clone()),
            },
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            config,
        );
        let orders = OrderService::new(Arc::new(store.clone()), Arc::new(cache));

        Self {
            saga,
            catalog,
            inventory,
            payments,
            store,
            orders,
        }
    }

    async fn place(&self, items: &[(&str, u32)]) -> Result<Order, SagaError> {
        self.saga
            .create_order(request(items, None), &RequestContext::new().with_token("t"))
            .await
    }
}

fn request(items: &[(&str, u32)], currency: Option<&str>) -> CreateOrder {
    CreateOrder {
        user_id: UserId::new("u1"),
        items: items
            .iter()
            .map(|(id, qty)| LineRequest::new(*id, *qty))
            .collect(),
        shipping_address: "1 Ship St".to_string(),
        billing_address: "2 Bill Ave".to_string(),
        notes: None,
        currency: currency.map(str::to_string),
    }
}

fn pid(id: &str) -> ProductId {
    ProductId::new(id)
}

#[tokio::test]
async fn test_happy_path_single_line() {
    let h = TestHarness::new().await;

    let order = h.place(&[("P1", 2)]).await.unwrap();

    assert_eq!(order.total_amount, Money::from_minor(2000, 2));
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_id.as_deref(), Some("PAY-0001"));

    assert_eq!(h.inventory.reserve_calls().await, vec![(pid("P1"), 2)]);
    assert!(h.inventory.release_calls().await.is_empty());
    assert_eq!(h.catalog.stock_updates().await, vec![(pid("P1"), -2)]);
    assert_eq!(h.catalog.stock(&pid("P1")).await, Some(3));

    let stored = h.store.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Confirmed);
    assert_eq!(stored.payment_id.as_deref(), Some("PAY-0001"));
    assert_eq!(stored.total_amount, Money::from_minor(2000, 2));
}

#[tokio::test]
async fn test_total_is_sum_of_captured_prices() {
    let h = TestHarness::new().await;

    let order = h.place(&[("P1", 2), ("P2", 1)]).await.unwrap();

    assert_eq!(order.total_amount, Money::from_minor(4550, 2));
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.items[0].unit_price, Money::from_minor(1000, 2));
    assert_eq!(order.items[0].subtotal, Money::from_minor(2000, 2));
    assert_eq!(order.items[1].unit_price, Money::from_minor(2550, 2));

    // A later price change does not touch the order.
    h.catalog.add_product("P1", Money::from_minor(9999, 2), 3).await;
    let stored = h.store.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.items[0].unit_price, Money::from_minor(1000, 2));
    assert_eq!(stored.total_amount, Money::from_minor(4550, 2));

    let charges = h.payments.charges().await;
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].amount, Money::from_minor(4550, 2));
    assert_eq!(charges[0].order_id, order.id);
}

#[tokio::test]
async fn test_charge_uses_configured_currency_and_method() {
    let h = TestHarness::new().await;

    h.place(&[("P1", 1)]).await.unwrap();
    h.saga
        .create_order(request(&[("P1", 1)], Some("USD")), &RequestContext::new())
        .await
        .unwrap();

    let charges = h.payments.charges().await;
    assert_eq!(charges[0].currency, "TRY");
    assert_eq!(charges[0].payment_method, "CREDIT_CARD");
    assert_eq!(charges[1].currency, "USD");
}

#[tokio::test]
async fn test_validation_error_makes_no_remote_calls() {
    let h = TestHarness::new().await;

    let empty = h.place(&[]).await;
    let zero = h.place(&[("P1", 0)]).await;

    assert!(matches!(empty, Err(SagaError::Validation(_))));
    assert!(matches!(zero, Err(SagaError::Validation(_))));
    assert!(h.catalog.calls().await.is_empty());
    assert!(h.inventory.calls().await.is_empty());
    assert_eq!(h.payments.attempts().await, 0);
}

#[tokio::test]
async fn test_malformed_currency_is_rejected_before_any_remote_call() {
    let h = TestHarness::new().await;

    for currency in ["NOT-A-CURRENCY", "usd", "EU"] {
        let result = h
            .saga
            .create_order(request(&[("P1", 1)], Some(currency)), &RequestContext::new())
            .await;
        assert!(matches!(result, Err(SagaError::Validation(_))), "{currency} accepted");
    }

    assert!(h.catalog.calls().await.is_empty());
    assert!(h.inventory.calls().await.is_empty());
    assert_eq!(h.payments.attempts().await, 0);
}

#[tokio::test]
async fn test_path_like_product_id_is_rejected_before_any_remote_call() {
    let h = TestHarness::new().await;

    let traversal = h.place(&[("../../payments/refund", 1)]).await;
    let query = h.place(&[("P1", 1), ("P2?quantity=1000", 1)]).await;

    assert!(matches!(traversal, Err(SagaError::Validation(_))));
    assert!(matches!(query, Err(SagaError::Validation(_))));
    assert!(h.catalog.calls().await.is_empty());
    assert!(h.inventory.calls().await.is_empty());
    assert_eq!(h.payments.attempts().await, 0);
}

#[tokio::test]
async fn test_catalog_price_is_rounded_to_cents_before_charge() {
    let h = TestHarness::new().await;
    h.catalog.add_product("P9", Money::from_minor(10005, 3), 10).await;

    let order = h.place(&[("P9", 2)]).await.unwrap();

    assert_eq!(order.items[0].unit_price.to_string(), "10.01");
    assert_eq!(order.total_amount.to_string(), "20.02");
    let charges = h.payments.charges().await;
    assert_eq!(charges[0].amount.to_string(), "20.02");
    let stored = h.store.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.total_amount, charges[0].amount);
}

#[tokio::test]
async fn test_insufficient_catalog_stock_reserves_nothing() {
    let h = TestHarness::new().await;

    let result = h.place(&[("P1", 6)]).await;

    assert!(matches!(
        result,
        Err(SagaError::InsufficientStock { ref product_id, requested: 6, available: Some(5) })
            if product_id.as_str() == "P1"
    ));
    assert!(h.inventory.calls().await.is_empty());
    assert_eq!(h.payments.attempts().await, 0);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_failed_inventory_check_means_zero_reservations() {
    let h = TestHarness::new().await;
    h.inventory.mark_unavailable("P2").await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::InsufficientStock { available: None, .. })
    ));
    assert_eq!(
        h.inventory.calls().await,
        vec![Call::CheckStock(pid("P1"), 2), Call::CheckStock(pid("P2"), 1)]
    );
    assert!(h.inventory.reserve_calls().await.is_empty());
    assert_eq!(h.payments.attempts().await, 0);
}

#[tokio::test]
async fn test_reservation_failure_releases_earlier_lines_in_reverse() {
    let h = TestHarness::new().await;
    h.inventory.reject_reserve("P3").await;

    let result = h.place(&[("P1", 2), ("P2", 1), ("P3", 4)]).await;

    assert!(matches!(
        result,
        Err(SagaError::ReservationFailed { ref product_id, .. }) if product_id.as_str() == "P3"
    ));
    assert_eq!(
        h.inventory.release_calls().await,
        vec![(pid("P2"), 1), (pid("P1"), 2)]
    );
    assert_eq!(h.inventory.reserved(&pid("P1")).await, 0);
    assert_eq!(h.inventory.reserved(&pid("P2")).await, 0);
    assert_eq!(h.payments.attempts().await, 0);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_reservation_failure_on_first_line_releases_nothing() {
    let h = TestHarness::new().await;
    h.inventory.reject_reserve("P1").await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    assert!(matches!(result, Err(SagaError::ReservationFailed { .. })));
    assert_eq!(h.inventory.reserve_calls().await, vec![(pid("P1"), 2)]);
    assert!(h.inventory.release_calls().await.is_empty());
}

#[tokio::test]
async fn test_payment_failure_releases_all_reservations_in_reverse() {
    let h = TestHarness::new().await;
    h.payments.set_decline(true).await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::PaymentFailed {
            source: ClientError::Upstream { status: 402, .. }
        })
    ));
    assert_eq!(
        h.inventory.release_calls().await,
        vec![(pid("P2"), 1), (pid("P1"), 2)]
    );
    assert_eq!(h.payments.attempts().await, 1);
    assert_eq!(h.store.order_count().await, 0);
    assert!(h.catalog.stock_updates().await.is_empty());
}

#[tokio::test]
async fn test_payment_error_releases_each_reservation_exactly_once() {
    let h = TestHarness::new().await;
    h.payments
        .fail_with(ClientError::Unavailable {
            service: "payment",
            reason: "timeout".to_string(),
        })
        .await;

    let result = h.place(&[("P1", 1), ("P2", 2), ("P3", 3)]).await;

    assert!(matches!(result, Err(SagaError::PaymentFailed { .. })));
    let mut released = h.inventory.release_calls().await;
    assert_eq!(released.len(), 3);
    released.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
    assert_eq!(
        released,
        vec![(pid("P1"), 1), (pid("P2"), 2), (pid("P3"), 3)]
    );
    // Never retried.
    assert_eq!(h.payments.attempts().await, 1);
}

#[tokio::test]
async fn test_failed_release_does_not_change_outcome() {
    let h = TestHarness::new().await;
    h.payments.set_decline(true).await;
    h.inventory.set_fail_release(true).await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    assert!(matches!(result, Err(SagaError::PaymentFailed { .. })));
    assert_eq!(h.inventory.release_calls().await.len(), 2);
}

#[tokio::test]
async fn test_persistence_failure_after_payment_is_fatal() {
    let h = TestHarness::new().await;
    h.store.set_fail_on_create(true);

    let result = h.place(&[("P1", 2)]).await;

    match result {
        Err(SagaError::Persistence { payment_id, .. }) => {
            assert_eq!(payment_id.as_deref(), Some("PAY-0001"));
        }
        other => panic!("expected persistence error, got {other:?}"),
    }
    // No compensation once money has moved.
    assert!(h.inventory.release_calls().await.is_empty());
    assert!(h.catalog.stock_updates().await.is_empty());
}

#[tokio::test]
async fn test_stock_commit_failure_cancels_order() {
    let h = TestHarness::new().await;
    h.catalog.fail_update_stock("P2").await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    let order_id = match result {
        Err(SagaError::StockCommit {
            order_id,
            ref product_id,
            ..
        }) if product_id.as_str() == "P2" => order_id,
        other => panic!("expected stock commit error, got {other:?}"),
    };
    let stored = h.store.get(order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
    assert_eq!(
        h.catalog.stock_updates().await,
        vec![(pid("P1"), -2), (pid("P2"), -1)]
    );
}

#[tokio::test]
async fn test_final_status_update_failure_is_persistence_error() {
    let h = TestHarness::new().await;
    h.store.set_fail_on_update(true);

    let result = h.place(&[("P1", 1)]).await;

    assert!(matches!(result, Err(SagaError::Persistence { .. })));
    assert_eq!(h.store.order_count().await, 1);
}

#[tokio::test]
async fn test_transient_product_lookup_is_retried() {
    let h = TestHarness::new().await;
    h.catalog.fail_lookups("P1", 2).await;

    let order = h.place(&[("P1", 1)]).await.unwrap();

    assert_eq!(order.status, OrderStatus::Confirmed);
    let lookups = h
        .catalog
        .calls()
        .await
        .into_iter()
        .filter(|c| matches!(c, Call::GetProduct(_)))
        .count();
    assert_eq!(lookups, 3);
}

#[tokio::test]
async fn test_product_lookup_gives_up_after_three_attempts() {
    let h = TestHarness::new().await;
    h.catalog.fail_lookups("P1", 10).await;

    let result = h.place(&[("P1", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::Upstream {
            step: SagaStep::LookupProduct,
            source: ClientError::Unavailable { .. }
        })
    ));
    assert_eq!(h.catalog.calls().await.len(), 3);
    assert!(h.inventory.calls().await.is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_not_retried() {
    let h = TestHarness::new().await;

    let result = h.place(&[("NOPE", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::Upstream {
            step: SagaStep::LookupProduct,
            source: ClientError::Upstream { status: 404, .. }
        })
    ));
    assert_eq!(h.catalog.calls().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_product_retry_waits_linearly() {
    let h = TestHarness::with_config(SagaConfig {
        deadline: None,
        ..Default::default()
    })
    .await;
    h.catalog.fail_lookups("P1", 2).await;
    let started = tokio::time::Instant::now();

    h.place(&[("P1", 1)]).await.unwrap();

    // 1s after the first failure, 2s after the second.
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_exceeded_releases_reservations() {
    let h = TestHarness::with_config(SagaConfig {
        deadline: Some(Duration::from_secs(1)),
        ..fast_config()
    })
    .await;
    h.inventory
        .set_reserve_delay(Duration::from_millis(600))
        .await;

    let result = h.place(&[("P1", 2), ("P2", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::DeadlineExceeded {
            step: SagaStep::Reserve
        })
    ));
    assert_eq!(h.inventory.release_calls().await, vec![(pid("P1"), 2)]);
    assert_eq!(h.payments.attempts().await, 0);
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_lookup_touches_nothing() {
    let h = TestHarness::with_config(SagaConfig {
        deadline: Some(Duration::from_millis(500)),
        ..fast_config()
    })
    .await;
    h.catalog.set_delay(Duration::from_secs(2)).await;

    let result = h.place(&[("P1", 1)]).await;

    assert!(matches!(
        result,
        Err(SagaError::DeadlineExceeded {
            step: SagaStep::LookupProduct
        })
    ));
    assert!(h.inventory.calls().await.is_empty());
}

#[tokio::test]
async fn test_confirmed_status_is_configurable() {
    let h = TestHarness::with_config(SagaConfig {
        confirmed_status: OrderStatus::Processing,
        ..fast_config()
    })
    .await;

    let order = h.place(&[("P1", 1)]).await.unwrap();

    assert_eq!(order.status, OrderStatus::Processing);
    let stored = h.store.get(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Processing);
}

#[tokio::test]
async fn test_new_order_invalidates_cached_order_list() {
    let h = TestHarness::new().await;
    let user = UserId::new("u1");

    let before = h
        .orders
        .get_user_orders(&user, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(before.total, 0);

    let order = h.place(&[("P1", 1)]).await.unwrap();

    let after = h
        .orders
        .get_user_orders(&user, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(after.total, 1);
    assert_eq!(after.items[0].id, order.id);
    assert_eq!(after.items[0].status, OrderStatus::Confirmed);
}

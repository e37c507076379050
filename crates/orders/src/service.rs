//! Cache-aside order queries and owner-scoped status commands.

use std::sync::Arc;

use cache::{CacheGateway, CacheGatewayExt};
use common::{OrderId, Page, PageRequest, UserId};
use domain::{Order, OrderError, OrderStatus};
use order_store::OrderStore;
use tracing::{debug, warn};

use crate::{OrderServiceError, Result, keys};

/// Reads and updates orders, keeping the cache consistent with the store.
///
/// The store is the source of truth. Reads go through the cache; writes go to
/// the store and then drop every cached copy of the order before returning,
/// so a read that follows a write never sees the old status.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    cache: Arc<dyn CacheGateway>,
}

impl OrderService {
    /// Creates a new order service.
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<dyn CacheGateway>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<dyn CacheGateway> {
        &self.cache
    }

    /// Gets an order by ID.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        let key = keys::order(order_id);
        if let Some(order) = self.cached::<Order>(&key, "order").await {
            return Ok(order);
        }

        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(OrderServiceError::NotFound(order_id))?;

        self.fill(&key, &order, keys::ORDER_TTL).await;
        Ok(order)
    }

    /// Gets an order owned by `user_id`. An order owned by someone else is
    /// reported as missing.
    pub async fn get_user_order(&self, order_id: OrderId, user_id: &UserId) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        if !order.is_owned_by(user_id) {
            return Err(OrderServiceError::NotFound(order_id));
        }
        Ok(order)
    }

    /// Lists a user's orders, newest first.
    #[tracing::instrument(skip(self), fields(user_id = %user_id))]
    pub async fn get_user_orders(&self, user_id: &UserId, page: PageRequest) -> Result<Page<Order>> {
        let key = keys::user_orders_page(user_id, page);
        if let Some(cached) = self.cached::<Page<Order>>(&key, "user_orders").await {
            return Ok(cached);
        }

        let orders = self.store.list_by_user(user_id, page).await?;
        self.fill(&key, &orders, keys::USER_ORDERS_TTL).await;
        Ok(orders)
    }

    /// Sets the status of an order owned by `user_id`.
    ///
    /// Any status may be set; only cancellation is guarded, by
    /// [`cancel_order`](Self::cancel_order).
    #[tracing::instrument(skip(self), fields(order_id = %order_id, status = %status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        user_id: &UserId,
        status: OrderStatus,
    ) -> Result<Order> {
        let mut order = self.load_owned(order_id, user_id).await?;

        self.store
            .update_status(order_id, status)
            .await
            .map_err(OrderServiceError::from_store)?;
        order.set_status(status);

        self.invalidate(order_id, user_id).await;
        Ok(order)
    }

    /// Cancels an order owned by `user_id`.
    ///
    /// Only `pending` and `processing` orders can be cancelled.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn cancel_order(&self, order_id: OrderId, user_id: &UserId) -> Result<Order> {
        let mut order = self.load_owned(order_id, user_id).await?;

        order.cancel().map_err(|e| match e {
            OrderError::InvalidStateTransition { from, to } => {
                OrderServiceError::InvalidStateTransition { from, to }
            }
            _ => OrderServiceError::InvalidStateTransition {
                from: order.status,
                to: OrderStatus::Cancelled,
            },
        })?;

        self.store
            .update_status(order_id, OrderStatus::Cancelled)
            .await
            .map_err(OrderServiceError::from_store)?;

        metrics::counter!("orders_cancelled_total").increment(1);
        self.invalidate(order_id, user_id).await;
        Ok(order)
    }

    /// Drops the cached copy of an order and every cached page of its
    /// owner's order list.
    ///
    /// Cache failures are logged and otherwise ignored; the entries expire
    /// on their own.
    pub async fn invalidate(&self, order_id: OrderId, user_id: &UserId) {
        let key = keys::order(order_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "failed to invalidate cached order");
        }

        let pattern = keys::user_orders_pattern(user_id);
        match self.cache.delete_pattern(&pattern).await {
            Ok(removed) => debug!(pattern = %pattern, removed, "invalidated user order pages"),
            Err(e) => warn!(pattern = %pattern, error = %e, "failed to invalidate user order pages"),
        }
    }

    /// Loads the current row from the store, bypassing the cache.
    async fn load_owned(&self, order_id: OrderId, user_id: &UserId) -> Result<Order> {
        let order = self
            .store
            .get(order_id)
            .await?
            .ok_or(OrderServiceError::NotFound(order_id))?;
        if !order.is_owned_by(user_id) {
            return Err(OrderServiceError::NotFound(order_id));
        }
        Ok(order)
    }

    async fn cached<T>(&self, key: &str, kind: &'static str) -> Option<T>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        match self.cache.get_json::<T>(key).await {
            Ok(Some(value)) => {
                metrics::counter!("cache_hits_total", "kind" => kind).increment(1);
                Some(value)
            }
            Ok(None) => {
                metrics::counter!("cache_misses_total", "kind" => kind).increment(1);
                None
            }
            Err(e) => {
                warn!(key, error = %e, "cache read failed, falling back to store");
                metrics::counter!("cache_misses_total", "kind" => kind).increment(1);
                None
            }
        }
    }

    async fn fill<T>(&self, key: &str, value: &T, ttl: std::time::Duration)
    where
        T: serde::Serialize + Sync,
    {
        if let Err(e) = self.cache.set_json(key, value, ttl).await {
            warn!(key, error = %e, "cache write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::InMemoryCache;
    use domain::{Money, OrderDetails, PricedLine};
    use order_store::InMemoryOrderStore;

    struct Fixture {
        store: InMemoryOrderStore,
        cache: InMemoryCache,
        service: OrderService,
    }

    fn fixture() -> Fixture {
        let store = InMemoryOrderStore::new();
        let cache = InMemoryCache::new();
        let service = OrderService::new(Arc::new(store.clone()), Arc::new(cache.clone()));
        Fixture {
            store,
            cache,
            service,
        }
    }

    async fn seed(store: &InMemoryOrderStore, user: &str) -> Order {
        let order = Order::new_pending(
            UserId::new(user),
            OrderDetails {
                currency: "TRY".to_string(),
                ..Default::default()
            },
            vec![PricedLine::new("P1", 2, Money::from_minor(1000, 2))],
        )
        .unwrap();
        store.create(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn get_order_is_served_from_cache_on_second_read() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;

        let first = f.service.get_order(order.id).await.unwrap();
        let second = f.service.get_order(order.id).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(f.store.get_calls(), 1);
        assert!(f.cache.contains(&keys::order(order.id)).await);
    }

    #[tokio::test]
    async fn get_missing_order_is_not_found() {
        let f = fixture();
        let result = f.service.get_order(OrderId::new()).await;
        assert!(matches!(result, Err(OrderServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn get_user_order_hides_other_owners() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;

        let result = f.service.get_user_order(order.id, &UserId::new("u2")).await;
        assert!(matches!(result, Err(OrderServiceError::NotFound(id)) if id == order.id));
    }

    #[tokio::test]
    async fn user_orders_second_read_does_not_query_store() {
        let f = fixture();
        seed(&f.store, "u1").await;
        seed(&f.store, "u1").await;
        let user = UserId::new("u1");

        let first = f
            .service
            .get_user_orders(&user, PageRequest::new(1, 10))
            .await
            .unwrap();
        let second = f
            .service
            .get_user_orders(&user, PageRequest::new(1, 10))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.total, 2);
        assert_eq!(f.store.list_calls(), 1);
    }

    #[tokio::test]
    async fn update_status_is_visible_to_next_read() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;
        let user = UserId::new("u1");

        // Warm both cache entries.
        f.service.get_order(order.id).await.unwrap();
        f.service
            .get_user_orders(&user, PageRequest::default())
            .await
            .unwrap();

        let updated = f
            .service
            .update_status(order.id, &user, OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);

        let read = f.service.get_order(order.id).await.unwrap();
        assert_eq!(read.status, OrderStatus::Shipped);

        let page = f
            .service
            .get_user_orders(&user, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.items[0].status, OrderStatus::Shipped);
        assert_eq!(f.store.list_calls(), 2);
    }

    #[tokio::test]
    async fn update_status_by_other_user_is_not_found() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;

        let result = f
            .service
            .update_status(order.id, &UserId::new("u2"), OrderStatus::Shipped)
            .await;
        assert!(matches!(result, Err(OrderServiceError::NotFound(_))));

        let stored = f.store.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn cancel_twice_is_rejected() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;
        let user = UserId::new("u1");

        let cancelled = f.service.cancel_order(order.id, &user).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);

        let again = f.service.cancel_order(order.id, &user).await;
        assert!(matches!(
            again,
            Err(OrderServiceError::InvalidStateTransition {
                from: OrderStatus::Cancelled,
                to: OrderStatus::Cancelled
            })
        ));
    }

    #[tokio::test]
    async fn cancel_shipped_order_is_rejected() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;
        let user = UserId::new("u1");
        f.service
            .update_status(order.id, &user, OrderStatus::Shipped)
            .await
            .unwrap();

        let result = f.service.cancel_order(order.id, &user).await;
        assert!(matches!(
            result,
            Err(OrderServiceError::InvalidStateTransition {
                from: OrderStatus::Shipped,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_store_error() {
        let f = fixture();
        let order = seed(&f.store, "u1").await;
        f.store.set_fail_on_update(true);

        let result = f
            .service
            .update_status(order.id, &UserId::new("u1"), OrderStatus::Shipped)
            .await;
        assert!(matches!(result, Err(OrderServiceError::Store(_))));
    }

    #[tokio::test]
    async fn invalidate_leaves_other_users_pages() {
        let f = fixture();
        let mine = seed(&f.store, "u1").await;
        seed(&f.store, "u2").await;
        f.service
            .get_user_orders(&UserId::new("u1"), PageRequest::default())
            .await
            .unwrap();
        f.service
            .get_user_orders(&UserId::new("u2"), PageRequest::default())
            .await
            .unwrap();

        f.service.invalidate(mine.id, &UserId::new("u1")).await;

        let other = keys::user_orders_page(&UserId::new("u2"), PageRequest::default());
        let gone = keys::user_orders_page(&UserId::new("u1"), PageRequest::default());
        assert!(f.cache.contains(&other).await);
        assert!(!f.cache.contains(&gone).await);
    }
}

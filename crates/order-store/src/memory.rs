use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, Page, PageRequest, UserId};
use domain::{Order, OrderStatus};
use tokio::sync::RwLock;

use crate::{OrderStore, Result, StoreError};

#[derive(Default)]
struct Counters {
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
    fail_on_create: AtomicBool,
    fail_on_update: AtomicBool,
    unavailable: AtomicBool,
}

/// In-memory order store for tests and local runs.
///
/// Provides the same interface as the PostgreSQL implementation. Read
/// calls are counted so callers can assert that a cache absorbed them, and
/// writes can be made to fail to exercise error paths.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    counters: Arc<Counters>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Number of `get` calls served so far.
    pub fn get_calls(&self) -> usize {
        self.counters.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `list_by_user` calls served so far.
    pub fn list_calls(&self) -> usize {
        self.counters.list_calls.load(Ordering::SeqCst)
    }

    /// Makes `create` fail until reset.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.counters.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Makes `update` and `update_status` fail until reset.
    pub fn set_fail_on_update(&self, fail: bool) {
        self.counters.fail_on_update.store(fail, Ordering::SeqCst);
    }

    /// Makes `ping` report the store as unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.counters.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn injected(flag: &AtomicBool, op: &str) -> Result<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("injected {op} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create(&self, order: &Order) -> Result<()> {
        Self::injected(&self.counters.fail_on_create, "create")?;

        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::AlreadyExists(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.counters.get_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.orders.read().await.get(&order_id).cloned())
    }

    async fn list_by_user(&self, user_id: &UserId, page: PageRequest) -> Result<Page<Order>> {
        self.counters.list_calls.fetch_add(1, Ordering::SeqCst);

        let orders = self.orders.read().await;
        let mut owned: Vec<&Order> = orders.values().filter(|o| o.is_owned_by(user_id)).collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.as_uuid().cmp(&b.id.as_uuid()))
        });

        let total = owned.len() as u64;
        let items = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, page, total))
    }

    async fn update(&self, order: &Order) -> Result<()> {
        Self::injected(&self.counters.fail_on_update, "update")?;

        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order.id)
            .ok_or(StoreError::NotFound(order.id))?;

        // Items are immutable once written.
        let items = std::mem::take(&mut stored.items);
        *stored = order.clone();
        stored.items = items;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        Self::injected(&self.counters.fail_on_update, "update_status")?;

        let mut orders = self.orders.write().await;
        let stored = orders
            .get_mut(&order_id)
            .ok_or(StoreError::NotFound(order_id))?;
        stored.set_status(status);
        Ok(())
    }

    async fn delete(&self, order_id: OrderId) -> Result<()> {
        self.orders
            .write()
            .await
            .remove(&order_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(order_id))
    }

    async fn ping(&self) -> Result<()> {
        Self::injected(&self.counters.unavailable, "ping")
    }
}

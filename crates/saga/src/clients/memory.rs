//! In-memory service doubles for tests and local runs.
//!
//! Every double records the calls it receives, in order, and can be told to
//! fail specific calls.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, ProductId};
use domain::Money;
use tokio::sync::RwLock;

use super::{
    ChargeRequest, ClientError, InventoryClient, PaymentClient, ProductClient, ProductInfo,
    RequestContext,
};

/// A call received by one of the doubles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetProduct(ProductId),
    CheckProductStock(ProductId, u32),
    UpdateStock(ProductId, i64),
    CheckStock(ProductId, u32),
    Reserve(ProductId, u32),
    Release(ProductId, u32),
    Charge { order_id: OrderId, amount: Money },
}

fn upstream(service: &'static str, status: u16, body: &str) -> ClientError {
    ClientError::Upstream {
        service,
        status,
        body: body.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Product catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CatalogState {
    products: HashMap<ProductId, ProductInfo>,
    calls: Vec<Call>,
    transient_failures: HashMap<ProductId, u32>,
    fail_update_stock: HashSet<ProductId>,
    delay: Option<Duration>,
}

/// In-memory product catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<CatalogState>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a product.
    pub async fn add_product(&self, product_id: impl Into<ProductId>, price: Money, stock: i64) {
        self.state
            .write()
            .await
            .products
            .insert(product_id.into(), ProductInfo { price, stock });
    }

    /// Makes the next `count` lookups of `product_id` fail as unavailable.
    pub async fn fail_lookups(&self, product_id: impl Into<ProductId>, count: u32) {
        self.state
            .write()
            .await
            .transient_failures
            .insert(product_id.into(), count);
    }

    /// Makes stock updates for `product_id` fail.
    pub async fn fail_update_stock(&self, product_id: impl Into<ProductId>) {
        self.state
            .write()
            .await
            .fail_update_stock
            .insert(product_id.into());
    }

    /// Delays every lookup by `delay`.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.write().await.delay = Some(delay);
    }

    /// Current stock of a product.
    pub async fn stock(&self, product_id: &ProductId) -> Option<i64> {
        self.state
            .read()
            .await
            .products
            .get(product_id)
            .map(|p| p.stock)
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.read().await.calls.clone()
    }

    /// Stock updates received, in order.
    pub async fn stock_updates(&self) -> Vec<(ProductId, i64)> {
        self.state
            .read()
            .await
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::UpdateStock(id, delta) => Some((id.clone(), *delta)),
                _ => None,
            })
            .collect()
    }

    async fn pause(&self) {
        let delay = self.state.read().await.delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl ProductClient for InMemoryProductCatalog {
    async fn get_product(&self, product_id: &ProductId, _ctx: &RequestContext) -> Result<ProductInfo, ClientError> {
        self.state
            .write()
            .await
            .calls
            .push(Call::GetProduct(product_id.clone()));
        self.pause().await;

        let mut state = self.state.write().await;
        if let Some(remaining) = state.transient_failures.get_mut(product_id)
            && *remaining > 0
        {
            *remaining -= 1;
            return Err(ClientError::Unavailable {
                service: "product",
                reason: "connection refused".to_string(),
            });
        }

        state
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| upstream("product", 404, "product not found"))
    }

    async fn check_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        _ctx: &RequestContext,
    ) -> Result<bool, ClientError> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(Call::CheckProductStock(product_id.clone(), quantity));
        Ok(state
            .products
            .get(product_id)
            .is_some_and(|p| p.stock >= i64::from(quantity)))
    }

    async fn update_stock(&self, product_id: &ProductId, delta: i64, _ctx: &RequestContext) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.calls.push(Call::UpdateStock(product_id.clone(), delta));

        if state.fail_update_stock.contains(product_id) {
            return Err(upstream("product", 500, "stock update failed"));
        }
        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| upstream("product", 404, "product not found"))?;
        if product.stock + delta < 0 {
            return Err(upstream("product", 400, "insufficient stock"));
        }
        product.stock += delta;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct InventoryState {
    available: HashMap<ProductId, i64>,
    reserved: HashMap<ProductId, u32>,
    calls: Vec<Call>,
    unavailable: HashSet<ProductId>,
    reject_reserve: HashSet<ProductId>,
    fail_release: bool,
    reserve_delay: Option<Duration>,
}

/// In-memory inventory.
///
/// Products without a configured stock level have unlimited stock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventory {
    state: Arc<RwLock<InventoryState>>,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reservable stock of a product.
    pub async fn set_stock(&self, product_id: impl Into<ProductId>, quantity: i64) {
        self.state
            .write()
            .await
            .available
            .insert(product_id.into(), quantity);
    }

    /// Makes `check_stock` answer "unavailable" for a product.
    pub async fn mark_unavailable(&self, product_id: impl Into<ProductId>) {
        self.state
            .write()
            .await
            .unavailable
            .insert(product_id.into());
    }

    /// Makes `reserve` fail for a product.
    pub async fn reject_reserve(&self, product_id: impl Into<ProductId>) {
        self.state
            .write()
            .await
            .reject_reserve
            .insert(product_id.into());
    }

    /// Makes every `release` fail.
    pub async fn set_fail_release(&self, fail: bool) {
        self.state.write().await.fail_release = fail;
    }

    /// Delays every `reserve` by `delay`.
    pub async fn set_reserve_delay(&self, delay: Duration) {
        self.state.write().await.reserve_delay = Some(delay);
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.read().await.calls.clone()
    }

    /// Reservations received, in order.
    pub async fn reserve_calls(&self) -> Vec<(ProductId, u32)> {
        self.filter_calls(|call| match call {
            Call::Reserve(id, qty) => Some((id.clone(), *qty)),
            _ => None,
        })
        .await
    }

    /// Releases received, in order.
    pub async fn release_calls(&self) -> Vec<(ProductId, u32)> {
        self.filter_calls(|call| match call {
            Call::Release(id, qty) => Some((id.clone(), *qty)),
            _ => None,
        })
        .await
    }

    /// Units currently held for a product.
    pub async fn reserved(&self, product_id: &ProductId) -> u32 {
        self.state
            .read()
            .await
            .reserved
            .get(product_id)
            .copied()
            .unwrap_or(0)
    }

    async fn filter_calls<T>(&self, f: impl Fn(&Call) -> Option<T>) -> Vec<T> {
        self.state.read().await.calls.iter().filter_map(f).collect()
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventory {
    async fn check_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        _ctx: &RequestContext,
    ) -> Result<bool, ClientError> {
        let mut state = self.state.write().await;
        state.calls.push(Call::CheckStock(product_id.clone(), quantity));

        if state.unavailable.contains(product_id) {
            return Ok(false);
        }
        Ok(state
            .available
            .get(product_id)
            .is_none_or(|available| *available >= i64::from(quantity)))
    }

    async fn reserve(&self, product_id: &ProductId, quantity: u32, _ctx: &RequestContext) -> Result<(), ClientError> {
        let delay = {
            let mut state = self.state.write().await;
            state.calls.push(Call::Reserve(product_id.clone(), quantity));
            state.reserve_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().await;
        if state.reject_reserve.contains(product_id) {
            return Err(upstream("inventory", 409, "reservation rejected"));
        }
        if let Some(available) = state.available.get_mut(product_id) {
            if *available < i64::from(quantity) {
                return Err(upstream("inventory", 409, "insufficient stock"));
            }
            *available -= i64::from(quantity);
        }
        *state.reserved.entry(product_id.clone()).or_default() += quantity;
        Ok(())
    }

    async fn release(&self, product_id: &ProductId, quantity: u32, _ctx: &RequestContext) -> Result<(), ClientError> {
        let mut state = self.state.write().await;
        state.calls.push(Call::Release(product_id.clone(), quantity));

        if state.fail_release {
            return Err(ClientError::Unavailable {
                service: "inventory",
                reason: "connection reset".to_string(),
            });
        }
        if let Some(available) = state.available.get_mut(product_id) {
            *available += i64::from(quantity);
        }
        let held = state.reserved.entry(product_id.clone()).or_default();
        *held = held.saturating_sub(quantity);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Payments
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct PaymentState {
    charges: Vec<ChargeRequest>,
    calls: Vec<Call>,
    next_id: u32,
    failure: Option<ClientError>,
}

/// In-memory payment service issuing sequential `PAY-0001` style ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPayments {
    state: Arc<RwLock<PaymentState>>,
}

impl InMemoryPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every charge get declined.
    pub async fn set_decline(&self, decline: bool) {
        self.state.write().await.failure =
            decline.then(|| upstream("payment", 402, "payment declined"));
    }

    /// Makes every charge fail with `error`.
    pub async fn fail_with(&self, error: ClientError) {
        self.state.write().await.failure = Some(error);
    }

    /// Successful charges, in order.
    pub async fn charges(&self) -> Vec<ChargeRequest> {
        self.state.read().await.charges.clone()
    }

    /// Every charge attempt, successful or not.
    pub async fn attempts(&self) -> usize {
        self.state.read().await.calls.len()
    }
}

#[async_trait]
impl PaymentClient for InMemoryPayments {
    async fn charge(&self, request: &ChargeRequest, _ctx: &RequestContext) -> Result<String, ClientError> {
        let mut state = self.state.write().await;
        state.calls.push(Call::Charge {
            order_id: request.order_id,
            amount: request.amount,
        });

        if let Some(error) = &state.failure {
            return Err(error.clone());
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        state.charges.push(request.clone());
        Ok(payment_id)
    }
}

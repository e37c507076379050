//! The order-creation saga.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use cache::CacheGateway;
use common::{ProductId, UserId};
use domain::{Order, OrderDetails, OrderStatus, PricedLine};
use order_store::OrderStore;
use orders::OrderService;
use serde::Deserialize;
use tokio::time::Instant as Deadline;
use tracing::{error, info, warn};

use crate::clients::{ChargeRequest, ClientError, InventoryClient, PaymentClient, ProductClient, ProductInfo, RequestContext};
use crate::config::SagaConfig;
use crate::error::{Result, SagaError, SagaStep};

/// The remote collaborators a saga drives. The saga owns them.
pub struct SagaClients {
    pub products: Box<dyn ProductClient>,
    pub inventory: Box<dyn InventoryClient>,
    pub payments: Box<dyn PaymentClient>,
}

/// One requested line of a new order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A request to create an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    pub user_id: UserId,
    pub items: Vec<LineRequest>,
    pub shipping_address: String,
    pub billing_address: String,
    pub notes: Option<String>,
    /// Overrides the configured currency.
    pub currency: Option<String>,
}

/// Stock reserved during one saga run, in reservation order.
type Reservations = Vec<(ProductId, u32)>;

/// Creates orders by coordinating the product catalog, inventory and
/// payment services with the order store.
///
/// Steps run sequentially per line so compensation can release reservations
/// in exact reverse order. Payment is attempted once per call; only product
/// lookups are retried.
pub struct OrderSaga {
    clients: SagaClients,
    store: Arc<dyn OrderStore>,
    orders: OrderService,
    config: SagaConfig,
}

impl OrderSaga {
    /// Creates a new saga.
    pub fn new(
        clients: SagaClients,
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn CacheGateway>,
        config: SagaConfig,
    ) -> Self {
        let orders = OrderService::new(store.clone(), cache);
        Self {
            clients,
            store,
            orders,
            config,
        }
    }

    pub fn config(&self) -> &SagaConfig {
        &self.config
    }

    /// Creates an order.
    ///
    /// On success the order has been charged, persisted, its stock
    /// committed, and it carries the configured confirmed status.
    #[tracing::instrument(
        skip(self, request, ctx),
        fields(user_id = %request.user_id, items = request.items.len())
    )]
    pub async fn create_order(&self, request: CreateOrder, ctx: &RequestContext) -> Result<Order> {
        let started = Instant::now();
        let result = self.run(request, ctx).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                info!(order_id = %order.id, total = %order.total_amount, "order created");
            }
            Err(e) => {
                metrics::counter!("orders_failed_total", "reason" => e.kind()).increment(1);
                if e.is_rejection() {
                    warn!(error = %e, "order rejected");
                } else {
                    error!(error = %e, "order creation failed");
                }
            }
        }
        result
    }

    async fn run(&self, request: CreateOrder, ctx: &RequestContext) -> Result<Order> {
        let currency = request
            .currency
            .clone()
            .unwrap_or_else(|| self.config.currency.clone());
        validate(&request, &currency)?;
        let deadline = self.config.deadline.map(|d| Deadline::now() + d);

        // Price every line against the catalog.
        let mut lines = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = within(deadline, SagaStep::LookupProduct, self.lookup_product(&item.product_id, ctx))
                .await?
                .map_err(|source| SagaError::Upstream {
                    step: SagaStep::LookupProduct,
                    source,
                })?;

            if product.stock < i64::from(item.quantity) {
                return Err(SagaError::InsufficientStock {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: Some(product.stock),
                });
            }
            lines.push(PricedLine::new(
                item.product_id.clone(),
                item.quantity,
                product.price.to_currency_scale(),
            ));
        }

        // Check inventory for every line before reserving anything.
        for item in &request.items {
            let available = within(
                deadline,
                SagaStep::CheckStock,
                self.clients
                    .inventory
                    .check_stock(&item.product_id, item.quantity, ctx),
            )
            .await?
            .map_err(|source| SagaError::Upstream {
                step: SagaStep::CheckStock,
                source,
            })?;

            if !available {
                return Err(SagaError::InsufficientStock {
                    product_id: item.product_id.clone(),
                    requested: item.quantity,
                    available: None,
                });
            }
        }

        let reserved = self.reserve_all(&request, deadline, ctx).await?;

        let details = OrderDetails {
            currency,
            shipping_address: request.shipping_address.clone(),
            billing_address: request.billing_address.clone(),
            notes: request.notes.clone(),
        };
        let mut order = match Order::new_pending(request.user_id.clone(), details, lines) {
            Ok(order) => order,
            Err(e) => {
                self.release_all(&reserved, ctx).await;
                return Err(SagaError::Validation(e.to_string()));
            }
        };

        let charge = ChargeRequest {
            order_id: order.id,
            user_id: order.user_id.clone(),
            amount: order.total_amount,
            currency: order.currency.clone(),
            payment_method: self.config.payment_method.clone(),
        };
        let payment_id = match within(
            deadline,
            SagaStep::Charge,
            self.clients.payments.charge(&charge, ctx),
        )
        .await
        {
            Ok(Ok(payment_id)) => payment_id,
            Ok(Err(source)) => {
                self.release_all(&reserved, ctx).await;
                return Err(SagaError::PaymentFailed { source });
            }
            Err(deadline_exceeded) => {
                self.release_all(&reserved, ctx).await;
                return Err(deadline_exceeded);
            }
        };

        order.attach_payment(payment_id.clone());
        if let Err(source) = self.store.create(&order).await {
            // The money has moved but there is no durable order. Needs
            // reconciliation by an operator.
            error!(
                order_id = %order.id,
                payment_id = %payment_id,
                error = %source,
                "charged order could not be persisted"
            );
            return Err(SagaError::Persistence {
                order_id: order.id,
                payment_id: Some(payment_id),
                source,
            });
        }

        if let Err(e) = self.commit_stock(&mut order, ctx).await {
            self.orders.invalidate(order.id, &order.user_id).await;
            return Err(e);
        }

        order.set_status(self.config.confirmed_status);
        let confirmed = self
            .store
            .update_status(order.id, order.status)
            .await
            .map_err(|source| SagaError::Persistence {
                order_id: order.id,
                payment_id: order.payment_id.clone(),
                source,
            });
        self.orders.invalidate(order.id, &order.user_id).await;
        confirmed?;

        Ok(order)
    }

    /// Looks up a product, retrying transient failures.
    async fn lookup_product(
        &self,
        product_id: &ProductId,
        ctx: &RequestContext,
    ) -> std::result::Result<ProductInfo, ClientError> {
        self.config
            .product_retry
            .retry(
                || self.clients.products.get_product(product_id, ctx),
                ClientError::is_transient,
            )
            .await
    }

    /// Reserves every line in order. On failure, releases what was reserved
    /// so far and returns the error.
    async fn reserve_all(
        &self,
        request: &CreateOrder,
        deadline: Option<Deadline>,
        ctx: &RequestContext,
    ) -> Result<Reservations> {
        let mut reserved = Reservations::with_capacity(request.items.len());
        for item in &request.items {
            let outcome = within(
                deadline,
                SagaStep::Reserve,
                self.clients
                    .inventory
                    .reserve(&item.product_id, item.quantity, ctx),
            )
            .await;

            match outcome {
                Ok(Ok(())) => reserved.push((item.product_id.clone(), item.quantity)),
                Ok(Err(source)) => {
                    self.release_all(&reserved, ctx).await;
                    return Err(SagaError::ReservationFailed {
                        product_id: item.product_id.clone(),
                        source,
                    });
                }
                Err(deadline_exceeded) => {
                    self.release_all(&reserved, ctx).await;
                    return Err(deadline_exceeded);
                }
            }
        }
        Ok(reserved)
    }

    /// Releases reservations in reverse order. Failures are logged and
    /// counted, never retried.
    async fn release_all(&self, reserved: &[(ProductId, u32)], ctx: &RequestContext) {
        for (product_id, quantity) in reserved.iter().rev() {
            if let Err(e) = self.clients.inventory.release(product_id, *quantity, ctx).await {
                metrics::counter!("saga_compensation_failures_total").increment(1);
                error!(
                    product_id = %product_id,
                    quantity,
                    error = %e,
                    "failed to release reservation"
                );
            }
        }
    }

    /// Decrements catalog stock for every line. On failure the persisted
    /// order is cancelled.
    async fn commit_stock(&self, order: &mut Order, ctx: &RequestContext) -> Result<()> {
        for index in 0..order.items.len() {
            let product_id = order.items[index].product_id.clone();
            let delta = -i64::from(order.items[index].quantity);

            if let Err(source) = self
                .clients
                .products
                .update_stock(&product_id, delta, ctx)
                .await
            {
                order.set_status(OrderStatus::Cancelled);
                if let Err(e) = self
                    .store
                    .update_status(order.id, OrderStatus::Cancelled)
                    .await
                {
                    error!(order_id = %order.id, error = %e, "failed to cancel order after stock commit failure");
                }
                return Err(SagaError::StockCommit {
                    order_id: order.id,
                    product_id,
                    source,
                });
            }
        }
        Ok(())
    }
}

fn validate(request: &CreateOrder, currency: &str) -> Result<()> {
    if request.items.is_empty() {
        return Err(SagaError::Validation(
            "order must contain at least one item".to_string(),
        ));
    }
    if !is_currency_code(currency) {
        return Err(SagaError::Validation(format!(
            "currency {currency:?} is not a three-letter ISO 4217 code"
        )));
    }
    for item in &request.items {
        if item.product_id.is_blank() {
            return Err(SagaError::Validation("product id must not be empty".to_string()));
        }
        if !is_path_safe(item.product_id.as_str()) {
            return Err(SagaError::Validation(format!(
                "product id {:?} contains reserved characters",
                item.product_id.as_str()
            )));
        }
        if item.quantity == 0 {
            return Err(SagaError::Validation(format!(
                "quantity for product {} must be at least 1",
                item.product_id
            )));
        }
    }
    Ok(())
}

/// Three ASCII uppercase letters, e.g. `USD`.
fn is_currency_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_uppercase())
}

/// Product ids travel as a single URL path segment to the catalog and
/// inventory services.
fn is_path_safe(id: &str) -> bool {
    id != "."
        && id != ".."
        && !id
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control())
}

/// Races `fut` against the saga deadline.
async fn within<T>(deadline: Option<Deadline>, step: SagaStep, fut: impl Future<Output = T>) -> Result<T> {
    match deadline {
        Some(at) => tokio::time::timeout_at(at, fut)
            .await
            .map_err(|_| SagaError::DeadlineExceeded { step }),
        None => Ok(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(items: Vec<LineRequest>) -> CreateOrder {
        CreateOrder {
            user_id: UserId::new("u1"),
            items,
            shipping_address: "1 Ship St".to_string(),
            billing_address: "2 Bill Ave".to_string(),
            notes: None,
            currency: None,
        }
    }

    #[test]
    fn validate_rejects_empty_items() {
        assert!(matches!(validate(&request(vec![]), "USD"), Err(SagaError::Validation(_))));
    }

    #[test]
    fn validate_rejects_zero_quantity() {
        let err = validate(&request(vec![LineRequest::new("P1", 0)]), "USD").unwrap_err();
        assert!(matches!(err, SagaError::Validation(msg) if msg.contains("P1")));
    }

    #[test]
    fn validate_rejects_blank_product() {
        let err = validate(&request(vec![LineRequest::new("  ", 1)]), "USD").unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        validate(&request(vec![LineRequest::new("P1", 2), LineRequest::new("P2", 1)]), "USD").unwrap();
    }

    #[test]
    fn validate_rejects_malformed_currency() {
        let items = || vec![LineRequest::new("P1", 1)];
        for bad in ["usd", "US", "EURO", "NOT-A-CURRENCY", "U$D", ""] {
            let err = validate(&request(items()), bad).unwrap_err();
            assert!(matches!(err, SagaError::Validation(_)), "{bad} accepted");
        }
        validate(&request(items()), "EUR").unwrap();
    }

    #[test]
    fn validate_rejects_product_ids_that_escape_their_path_segment() {
        for bad in ["../../payments/refund", "a/b", "P1?quantity=999", "P1#frag", "P%2F1", "..", ".", "a\\b"] {
            let err = validate(&request(vec![LineRequest::new(bad, 1)]), "USD").unwrap_err();
            assert!(matches!(err, SagaError::Validation(_)), "{bad} accepted");
        }
        validate(&request(vec![LineRequest::new("SKU-1.v2_x", 1)]), "USD").unwrap();
    }

    #[tokio::test]
    async fn within_without_deadline_just_awaits() {
        let value = within(None, SagaStep::Charge, async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn within_reports_the_step_that_timed_out() {
        let at = Deadline::now() + std::time::Duration::from_millis(10);
        let result = within(Some(at), SagaStep::Reserve, tokio::time::sleep(std::time::Duration::from_secs(1))).await;
        assert!(matches!(result, Err(SagaError::DeadlineExceeded { step: SagaStep::Reserve })));
    }
}

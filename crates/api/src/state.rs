//! Shared application state.

use std::sync::Arc;

use cache::CacheGateway;
use order_store::OrderStore;
use orders::OrderService;
use saga::clients::{
    HttpInventoryClient, HttpPaymentClient, HttpProductClient, HttpUserClient, UserClient,
};
use saga::{ClientError, OrderSaga, SagaClients};

use crate::config::Config;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub saga: Arc<OrderSaga>,
    pub orders: OrderService,
    pub users: Arc<dyn UserClient>,
}

impl AppState {
    pub fn new(saga: OrderSaga, orders: OrderService, users: Arc<dyn UserClient>) -> Self {
        Self {
            saga: Arc::new(saga),
            orders,
            users,
        }
    }

    /// Wires the saga and query service to the HTTP clients named in `config`.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn OrderStore>,
        cache: Arc<dyn CacheGateway>,
    ) -> Result<Self, ClientError> {
        let clients = SagaClients {
            products: Box::new(HttpProductClient::new(&config.client(&config.product_service_url))?),
            inventory: Box::new(HttpInventoryClient::new(
                &config.client(&config.inventory_service_url),
            )?),
            payments: Box::new(HttpPaymentClient::new(&config.client(&config.payment_service_url))?),
        };
        let users = HttpUserClient::new(&config.client(&config.user_service_url))?;

        let saga = OrderSaga::new(clients, store.clone(), cache.clone(), config.saga());
        let orders = OrderService::new(store, cache);
        Ok(Self::new(saga, orders, Arc::new(users)))
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        self.orders.store()
    }

    pub fn cache(&self) -> &Arc<dyn CacheGateway> {
        self.orders.cache()
    }
}

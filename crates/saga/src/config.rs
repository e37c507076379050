use std::time::Duration;

use domain::OrderStatus;

use crate::retry::RetryPolicy;

/// Settings for [`OrderSaga`](crate::OrderSaga).
#[derive(Debug, Clone)]
pub struct SagaConfig {
    /// Currency used when the request does not name one.
    pub currency: String,
    /// Payment method sent with every charge.
    pub payment_method: String,
    /// Upper bound for steps up to and including the charge. `None` leaves
    /// only the per-call timeouts.
    pub deadline: Option<Duration>,
    /// Retry schedule for product lookups.
    pub product_retry: RetryPolicy,
    /// Status written once stock has been committed.
    pub confirmed_status: OrderStatus,
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            currency: "TRY".to_string(),
            payment_method: "CREDIT_CARD".to_string(),
            deadline: Some(Duration::from_secs(30)),
            product_retry: RetryPolicy::product_lookup(),
            confirmed_status: OrderStatus::Confirmed,
        }
    }
}

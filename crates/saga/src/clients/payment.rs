//! Payment service client.

use async_trait::async_trait;
use common::{OrderId, UserId};
use domain::Money;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::{ClientConfig, ClientError, Envelope, HttpService, RequestContext};

const SERVICE: &str = "payment";

/// A request to charge a user for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub payment_method: String,
}

/// Charges users.
///
/// A charge is attempted exactly once per order; implementations must not
/// retry internally.
#[async_trait]
pub trait PaymentClient: Send + Sync {
    /// Charges `request.amount` and returns the payment id.
    async fn charge(&self, request: &ChargeRequest, ctx: &RequestContext) -> Result<String, ClientError>;
}

#[derive(Debug, Deserialize)]
struct PaymentData {
    #[serde(alias = "payment_id")]
    id: String,
}

/// HTTP client for the payment service.
#[derive(Debug, Clone)]
pub struct HttpPaymentClient {
    http: HttpService,
}

impl HttpPaymentClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpService::new(SERVICE, config)?,
        })
    }
}

#[async_trait]
impl PaymentClient for HttpPaymentClient {
    #[tracing::instrument(skip(self, request, ctx), fields(order_id = %request.order_id, amount = %request.amount))]
    async fn charge(&self, request: &ChargeRequest, ctx: &RequestContext) -> Result<String, ClientError> {
        let builder = self
            .http
            .request(Method::POST, &["api", "payments"], ctx)
            .json(request);
        let envelope: Envelope<PaymentData> = self.http.send(builder).await?;
        envelope
            .accepted(SERVICE)?
            .map(|data| data.id)
            .ok_or_else(|| ClientError::decode(SERVICE, "payment id missing from response"))
    }
}

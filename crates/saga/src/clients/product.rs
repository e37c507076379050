//! Product catalog client.

use std::str::FromStr;

use async_trait::async_trait;
use common::ProductId;
use domain::Money;
use reqwest::Method;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ClientConfig, ClientError, HttpService, RequestContext};

const SERVICE: &str = "product";

/// Price and stock of a product at lookup time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductInfo {
    pub price: Money,
    pub stock: i64,
}

/// The product catalog: prices, stock checks and stock commits.
#[async_trait]
pub trait ProductClient: Send + Sync {
    /// Looks up a product's current price and stock.
    async fn get_product(&self, product_id: &ProductId, ctx: &RequestContext) -> Result<ProductInfo, ClientError>;

    /// Asks whether `quantity` units are available.
    async fn check_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ctx: &RequestContext,
    ) -> Result<bool, ClientError>;

    /// Adjusts stock by `delta`; negative values decrement.
    async fn update_stock(&self, product_id: &ProductId, delta: i64, ctx: &RequestContext) -> Result<(), ClientError>;
}

/// A price the catalog sends either as a decimal string or a JSON number.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PriceValue {
    Text(String),
    Number(serde_json::Number),
}

impl PriceValue {
    fn to_money(&self) -> Result<Money, ClientError> {
        let raw = match self {
            PriceValue::Text(s) => s.clone(),
            PriceValue::Number(n) => n.to_string(),
        };
        Decimal::from_str(raw.trim())
            .map(Money::new)
            .map_err(|e| ClientError::decode(SERVICE, format!("invalid price {raw:?}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct ProductData {
    price: PriceValue,
    stock: i64,
}

#[derive(Debug, Deserialize)]
struct StockCheckData {
    is_available: bool,
}

#[derive(Debug, Deserialize)]
struct DataResponse<T> {
    data: T,
}

#[derive(Debug, Serialize)]
struct UpdateStockRequest {
    quantity: i64,
}

/// HTTP client for the product catalog service.
#[derive(Debug, Clone)]
pub struct HttpProductClient {
    http: HttpService,
}

impl HttpProductClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpService::new(SERVICE, config)?,
        })
    }
}

#[async_trait]
impl ProductClient for HttpProductClient {
    #[tracing::instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn get_product(&self, product_id: &ProductId, ctx: &RequestContext) -> Result<ProductInfo, ClientError> {
        let request = self
            .http
            .request(Method::GET, &["api", "products", product_id.as_str(), ""], ctx);
        let response: DataResponse<ProductData> = self.http.send(request).await?;

        Ok(ProductInfo {
            price: response.data.price.to_money()?,
            stock: response.data.stock,
        })
    }

    #[tracing::instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn check_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ctx: &RequestContext,
    ) -> Result<bool, ClientError> {
        let request = self
            .http
            .request(
                Method::GET,
                &["api", "products", product_id.as_str(), "check_stock", ""],
                ctx,
            )
            .query(&[("quantity", quantity)]);
        let response: DataResponse<StockCheckData> = self.http.send(request).await?;
        Ok(response.data.is_available)
    }

    #[tracing::instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn update_stock(&self, product_id: &ProductId, delta: i64, ctx: &RequestContext) -> Result<(), ClientError> {
        let request = self
            .http
            .request(
                Method::POST,
                &["api", "products", product_id.as_str(), "update_stock", ""],
                ctx,
            )
            .json(&UpdateStockRequest { quantity: delta });
        self.http.send_unit(request).await?;
        tracing::debug!(service = self.http.service(), delta, "stock updated");
        Ok(())
    }
}

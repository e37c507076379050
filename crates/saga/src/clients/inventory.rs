//! Inventory service client.

use async_trait::async_trait;
use common::ProductId;
use reqwest::Method;
use serde::Deserialize;

use super::{ClientConfig, ClientError, Envelope, HttpService, RequestContext};

const SERVICE: &str = "inventory";

/// Stock reservations held by the inventory service.
///
/// `reserve` is treated as an atomic check-and-claim; this side never locks.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Asks whether `quantity` units can be reserved.
    async fn check_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        ctx: &RequestContext,
    ) -> Result<bool, ClientError>;

    /// Claims `quantity` units.
    async fn reserve(&self, product_id: &ProductId, quantity: u32, ctx: &RequestContext) -> Result<(), ClientError>;

    /// Returns previously claimed units.
    async fn release(&self, product_id: &ProductId, quantity: u32, ctx: &RequestContext) -> Result<(), ClientError>;
}

/// Availability answer; either a bare boolean or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Availability {
    Flag(bool),
    Detailed {
        #[serde(alias = "available")]
        is_available: bool,
    },
}

impl Availability {
    fn is_available(&self) -> bool {
        match self {
            Availability::Flag(flag) => *flag,
            Availability::Detailed { is_available } => *is_available,
        }
    }
}

/// HTTP client for the inventory service.
#[derive(Debug, Clone)]
pub struct HttpInventoryClient {
    http: HttpService,
}

impl HttpInventoryClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpService::new(SERVICE, config)?,
        })
    }

    async fn claim(
        &self,
        action: &str,
        product_id: &ProductId,
        quantity: u32,
        ctx: &RequestContext,
    ) -> Result<(), ClientError> {
        let request = self
            .http
            .request(
                Method::POST,
                &["api", "inventory", "product", product_id.as_str(), action],
                ctx,
            )
            .query(&[("quantity", quantity)]);
        let envelope: Envelope<serde_json::Value> = self.http.send(request).await?;
        envelope.accepted(SERVICE)?;
        Ok(())
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
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
                &["api", "inventory", "product", product_id.as_str(), "check"],
                ctx,
            )
            .query(&[("quantity", quantity)]);
        let envelope: Envelope<Availability> = self.http.send(request).await?;
        envelope
            .accepted(SERVICE)?
            .map(|a| a.is_available())
            .ok_or_else(|| ClientError::decode(SERVICE, "missing availability data"))
    }

    #[tracing::instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn reserve(&self, product_id: &ProductId, quantity: u32, ctx: &RequestContext) -> Result<(), ClientError> {
        self.claim("reserve", product_id, quantity, ctx).await
    }

    #[tracing::instrument(skip(self, ctx), fields(product_id = %product_id))]
    async fn release(&self, product_id: &ProductId, quantity: u32, ctx: &RequestContext) -> Result<(), ClientError> {
        self.claim("release", product_id, quantity, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_accepts_bool_or_object() {
        let bare: Envelope<Availability> =
            serde_json::from_str(r#"{"success":true,"data":true}"#).unwrap();
        assert!(bare.accepted(SERVICE).unwrap().unwrap().is_available());

        let object: Envelope<Availability> =
            serde_json::from_str(r#"{"success":true,"data":{"available":false}}"#).unwrap();
        assert!(!object.accepted(SERVICE).unwrap().unwrap().is_available());

        let named: Envelope<Availability> =
            serde_json::from_str(r#"{"data":{"is_available":true}}"#).unwrap();
        assert!(named.accepted(SERVICE).unwrap().unwrap().is_available());
    }
}

//! Clients for the product, inventory, payment and user services.
//!
//! Each collaborator is a trait with a `reqwest` implementation and, for the
//! three the saga drives, an in-memory double for tests.

pub mod inventory;
pub mod memory;
pub mod payment;
pub mod product;
pub mod user;

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

pub use inventory::{HttpInventoryClient, InventoryClient};
pub use memory::{
    Call, InMemoryInventory, InMemoryPayments, InMemoryProductCatalog,
};
pub use payment::{ChargeRequest, HttpPaymentClient, PaymentClient};
pub use product::{HttpProductClient, ProductClient, ProductInfo};
pub use user::{AuthenticatedUser, HttpUserClient, UserClient};

/// Headers forwarded from the inbound request to every outbound call.
pub const PROPAGATED_HEADERS: [&str; 3] = ["traceparent", "tracestate", "x-request-id"];

/// Per-request data carried onto outbound calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// The caller's bearer token, forwarded as-is.
    pub token: Option<String>,
    /// Opaque trace headers.
    pub headers: Vec<(String, String)>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Where a remote service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl ClientConfig {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Errors from remote service calls. Every variant names the service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The service could not be reached or did not answer in time.
    #[error("{service} service unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The service answered with a failure.
    #[error("{service} service returned {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {service} service: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },
}

impl ClientError {
    pub fn service(&self) -> &'static str {
        match self {
            ClientError::Unavailable { service, .. }
            | ClientError::Upstream { service, .. }
            | ClientError::Decode { service, .. } => service,
        }
    }

    /// True when trying again might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Unavailable { .. } => true,
            ClientError::Upstream { status, .. } => *status >= 500 || *status == 429,
            ClientError::Decode { .. } => false,
        }
    }

    pub(crate) fn unavailable(service: &'static str, reason: impl ToString) -> Self {
        ClientError::Unavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn decode(service: &'static str, reason: impl ToString) -> Self {
        ClientError::Decode {
            service,
            reason: reason.to_string(),
        }
    }
}

/// Shared `reqwest` plumbing for the service clients.
#[derive(Debug, Clone)]
pub(crate) struct HttpService {
    service: &'static str,
    base_url: Url,
    http: reqwest::Client,
}

impl HttpService {
    pub(crate) fn new(service: &'static str, config: &ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::unavailable(service, e))?;
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ClientError::unavailable(service, format!("invalid base url {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::unavailable(
                service,
                format!("invalid base url {:?}", config.base_url),
            ));
        }
        Ok(Self {
            service,
            base_url,
            http,
        })
    }

    pub(crate) fn service(&self) -> &'static str {
        self.service
    }

    /// Builds `{base_url}/{segment}/...`. Each segment is percent-encoded, so
    /// `/`, `?` and `#` inside an id stay inside that segment. A trailing
    /// `""` segment yields a trailing slash.
    pub(crate) fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Starts a request to [`HttpService::url`] carrying the caller's token
    /// and trace headers.
    pub(crate) fn request(&self, method: Method, segments: &[&str], ctx: &RequestContext) -> RequestBuilder {
        let mut builder = self.http.request(method, self.url(segments));
        if let Some(token) = &ctx.token {
            builder = builder.bearer_auth(token);
        }
        for (name, value) in &ctx.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
    }

    /// Sends a request and decodes a 2xx JSON body.
    pub(crate) async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::unavailable(self.service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Upstream {
                service: self.service,
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ClientError::unavailable(self.service, e))?;
        serde_json::from_slice(&bytes).map_err(|e| ClientError::decode(self.service, e))
    }

    /// Sends a request and checks for a 2xx, ignoring the body.
    pub(crate) async fn send_unit(&self, builder: RequestBuilder) -> Result<(), ClientError> {
        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::unavailable(self.service, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Upstream {
                service: self.service,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// `{success, data, message}` envelope used by the inventory and payment
/// services. A missing `success` field counts as success.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    /// Turns `success: false` on a 2xx into an upstream error.
    pub(crate) fn accepted(self, service: &'static str) -> Result<Option<T>, ClientError> {
        if self.success == Some(false) {
            return Err(ClientError::Upstream {
                service,
                status: 200,
                body: self.message.unwrap_or_else(|| "request rejected".to_string()),
            });
        }
        Ok(self.data)
    }
}

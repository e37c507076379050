//! User service client used to validate bearer tokens.

use async_trait::async_trait;
use common::UserId;
use reqwest::Method;
use serde::Deserialize;

use super::{ClientConfig, ClientError, HttpService, RequestContext};

const SERVICE: &str = "user";

/// The user a bearer token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub email: Option<String>,
}

/// Validates bearer tokens.
#[async_trait]
pub trait UserClient: Send + Sync {
    /// Resolves `token` to its user. A rejected token is an
    /// [`ClientError::Upstream`] with status 401.
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    status: Option<String>,
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    #[serde(default)]
    valid: Option<bool>,
    #[serde(alias = "userId")]
    user_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl ValidateResponse {
    fn into_user(self) -> Result<AuthenticatedUser, ClientError> {
        let rejected = |reason: &str| ClientError::Upstream {
            service: SERVICE,
            status: 401,
            body: reason.to_string(),
        };

        if self.status.as_deref().is_some_and(|s| s != "success") {
            return Err(rejected("token rejected"));
        }
        let data = self.data.ok_or_else(|| rejected("token rejected"))?;
        if data.valid == Some(false) {
            return Err(rejected("token invalid"));
        }
        let user_id = data
            .user_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::decode(SERVICE, "user id missing from response"))?;

        Ok(AuthenticatedUser {
            user_id: UserId::new(user_id),
            email: data.email,
        })
    }
}

/// HTTP client for the user service.
#[derive(Debug, Clone)]
pub struct HttpUserClient {
    http: HttpService,
}

impl HttpUserClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            http: HttpService::new(SERVICE, config)?,
        })
    }
}

#[async_trait]
impl UserClient for HttpUserClient {
    #[tracing::instrument(skip_all)]
    async fn validate(&self, token: &str) -> Result<AuthenticatedUser, ClientError> {
        let ctx = RequestContext::new().with_token(token);
        let request = self.http.request(Method::POST, &["api", "auth", "validate"], &ctx);
        let response: ValidateResponse = self.http.send(request).await?;
        response.into_user()
    }
}

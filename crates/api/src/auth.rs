//! Bearer-token authentication for the order routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use saga::RequestContext;
use saga::clients::PROPAGATED_HEADERS;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated caller and the context forwarded on outbound calls.
///
/// Extracting this validates the `Authorization: Bearer` token through the
/// user service and copies trace headers into the [`RequestContext`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub ctx: RequestContext,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let user = state.users.validate(&token).await.map_err(|err| {
            tracing::warn!(error = %err, "token validation failed");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let mut ctx = RequestContext::new().with_token(token);
        for name in PROPAGATED_HEADERS {
            if let Some(value) = parts.headers.get(name).and_then(|v| v.to_str().ok()) {
                ctx = ctx.with_header(name, value);
            }
        }

        Ok(Self {
            user_id: user.user_id,
            ctx,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<String, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthorized("Authorization header required".to_string()))?;

    let value = header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid authorization header".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim().to_string())
        }
        _ => Err(ApiError::Unauthorized(
            "Invalid authorization header format".to_string(),
        )),
    }
}

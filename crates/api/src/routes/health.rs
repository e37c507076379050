//! Liveness and readiness endpoints.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub status: &'static str,
    pub database: &'static str,
    pub cache: &'static str,
}

/// GET /health: the process is up.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// GET /ready: the store and the cache answer.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let database = match state.store().ping().await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::warn!(error = %err, "order store ping failed");
            "disconnected"
        }
    };
    let cache = match state.cache().ping().await {
        Ok(()) => "connected",
        Err(err) => {
            tracing::warn!(error = %err, "cache ping failed");
            "disconnected"
        }
    };

    if database == "connected" && cache == "connected" {
        let body = ReadyResponse {
            status: "ready",
            database,
            cache,
        };
        (StatusCode::OK, Json(body))
    } else {
        let body = ReadyResponse {
            status: "degraded",
            database,
            cache,
        };
        (StatusCode::SERVICE_UNAVAILABLE, Json(body))
    }
}

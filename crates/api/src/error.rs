//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use orders::OrderServiceError;
use saga::SagaError;
use thiserror::Error;

/// API-level error type that maps to `{status: "error", message}` responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Orders(#[from] OrderServiceError),

    #[error(transparent)]
    Saga(#[from] SagaError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Orders(err) => match err {
                OrderServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                OrderServiceError::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,
                OrderServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Saga(err) if err.is_rejection() => StatusCode::BAD_REQUEST,
            ApiError::Saga(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(format!("Invalid query: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, ProductId};
    use domain::OrderStatus;
    use saga::{ClientError, SagaStep};

    use super::*;

    #[test]
    fn test_business_rejections_are_bad_requests() {
        let err = ApiError::from(SagaError::InsufficientStock {
            product_id: ProductId::new("P1"),
            requested: 3,
            available: Some(1),
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(SagaError::PaymentFailed {
            source: ClientError::Upstream {
                service: "payment",
                status: 402,
                body: "declined".to_string(),
            },
        });
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_saga_infrastructure_failures_are_server_errors() {
        let err = ApiError::from(SagaError::DeadlineExceeded {
            step: SagaStep::Reserve,
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_order_service_errors() {
        let id = OrderId::new();
        assert_eq!(
            ApiError::from(OrderServiceError::NotFound(id)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(OrderServiceError::InvalidStateTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Cancelled,
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
    }
}

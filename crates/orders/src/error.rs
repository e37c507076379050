use common::OrderId;
use domain::OrderStatus;
use order_store::StoreError;
use thiserror::Error;

/// Errors returned by [`OrderService`](crate::OrderService).
#[derive(Debug, Error)]
pub enum OrderServiceError {
    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The requested status change is not allowed from the current status.
    #[error("Cannot change order status from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl OrderServiceError {
    /// Maps a store error, keeping `NotFound` as a service-level miss.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            other => Self::Store(other),
        }
    }
}

/// Result type for order service operations.
pub type Result<T> = std::result::Result<T, OrderServiceError>;

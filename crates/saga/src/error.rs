//! Saga error types.

use common::{OrderId, ProductId};
use order_store::StoreError;
use thiserror::Error;

use crate::clients::ClientError;

/// The step of the order-creation saga an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SagaStep {
    Validate,
    LookupProduct,
    CheckStock,
    Reserve,
    Charge,
    Persist,
    CommitStock,
    Confirm,
}

impl SagaStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStep::Validate => "validate",
            SagaStep::LookupProduct => "lookup_product",
            SagaStep::CheckStock => "check_stock",
            SagaStep::Reserve => "reserve",
            SagaStep::Charge => "charge",
            SagaStep::Persist => "persist",
            SagaStep::CommitStock => "commit_stock",
            SagaStep::Confirm => "confirm",
        }
    }
}

impl std::fmt::Display for SagaStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the order-creation saga.
///
/// Each variant tells the caller what was left behind: nothing for
/// `Validation` and `InsufficientStock`, released reservations for
/// `ReservationFailed` and `PaymentFailed`, a charged payment without an order
/// for `Persistence`, and a cancelled order for `StockCommit`.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The request is malformed. No remote call was made.
    #[error("Invalid order request: {0}")]
    Validation(String),

    /// Not enough stock for a line.
    #[error("Insufficient stock for product {product_id}: requested {requested}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: Option<i64>,
    },

    /// A reservation was rejected; earlier reservations were released.
    #[error("Failed to reserve product {product_id}: {source}")]
    ReservationFailed {
        product_id: ProductId,
        #[source]
        source: ClientError,
    },

    /// The charge failed; every reservation was released.
    #[error("Payment failed: {source}")]
    PaymentFailed {
        #[source]
        source: ClientError,
    },

    /// The payment went through but the order could not be written.
    #[error("Failed to persist order {order_id} (payment {payment_id:?}): {source}")]
    Persistence {
        order_id: OrderId,
        payment_id: Option<String>,
        #[source]
        source: StoreError,
    },

    /// Decrementing product stock failed; the order was cancelled.
    #[error("Failed to commit stock for product {product_id} of order {order_id}: {source}")]
    StockCommit {
        order_id: OrderId,
        product_id: ProductId,
        #[source]
        source: ClientError,
    },

    /// A collaborator failed outside of reservation and payment.
    #[error("Upstream failure during {step}: {source}")]
    Upstream {
        step: SagaStep,
        #[source]
        source: ClientError,
    },

    /// The saga ran out of time. Reservations made so far were released.
    #[error("Order creation timed out during {step}")]
    DeadlineExceeded { step: SagaStep },
}

impl SagaError {
    /// True for rejections caused by the request or by business rules, as
    /// opposed to infrastructure failures.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SagaError::Validation(_)
                | SagaError::InsufficientStock { .. }
                | SagaError::ReservationFailed { .. }
                | SagaError::PaymentFailed { .. }
        )
    }

    /// Short label used for the `reason` metric tag.
    pub fn kind(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::ReservationFailed { .. } => "reservation_failed",
            SagaError::PaymentFailed { .. } => "payment_failed",
            SagaError::Persistence { .. } => "persistence",
            SagaError::StockCommit { .. } => "stock_commit",
            SagaError::Upstream { .. } => "upstream",
            SagaError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

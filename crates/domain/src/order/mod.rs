//! Order entity, status machine and related value objects.

mod model;
mod state;
mod value_objects;

pub use model::{Order, OrderDetails, OrderItem};
pub use state::OrderStatus;
pub use value_objects::{CURRENCY_SCALE, Money, PricedLine};

use thiserror::Error;

/// Errors that can occur when building or mutating an order.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The order has no line items.
    #[error("Order must contain at least one item")]
    NoItems,

    /// A line quantity is not positive.
    #[error("Invalid quantity {quantity} for product {product_id} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// A captured unit price is negative.
    #[error("Invalid price {price} for product {product_id}")]
    InvalidPrice { product_id: String, price: Money },

    /// A monetary amount could not be parsed.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// The status name is not one of the known statuses.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),

    /// The requested transition is not allowed from the current status.
    #[error("Invalid state transition: cannot move order from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },
}

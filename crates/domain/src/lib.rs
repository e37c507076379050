//! Domain model for the order service.
//!
//! This crate holds the order entity and its line items, the order status
//! state machine and the `Money` value object. It has no I/O; persistence,
//! caching and remote calls live in the crates that depend on it.

pub mod order;

pub use common::{OrderId, ProductId, UserId};
pub use order::{
    CURRENCY_SCALE, Money, Order, OrderDetails, OrderError, OrderItem, OrderStatus, PricedLine,
};

//! Order queries and status commands.
//!
//! [`OrderService`] serves reads cache-aside over an
//! [`OrderStore`](order_store::OrderStore) and invalidates the cached copies
//! of an order whenever it writes one.

pub mod error;
pub mod keys;
pub mod service;

pub use error::{OrderServiceError, Result};
pub use service::OrderService;

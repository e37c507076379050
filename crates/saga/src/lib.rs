//! Order-creation saga.
//!
//! [`OrderSaga::create_order`] prices the requested lines, reserves stock,
//! charges the user, persists the order and commits stock. A failure before
//! the charge succeeds releases every reservation in reverse order; payment is
//! never retried.

pub mod clients;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod retry;

pub use clients::{ClientConfig, ClientError, RequestContext};
pub use config::SagaConfig;
pub use coordinator::{CreateOrder, LineRequest, OrderSaga, SagaClients};
pub use error::{Result, SagaError, SagaStep};
pub use retry::{Backoff, LinearBuilder, RetryPolicy};

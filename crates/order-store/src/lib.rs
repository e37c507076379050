//! Persistence for orders and their line items.
//!
//! [`OrderStore`] is implemented by [`PostgresOrderStore`] for production and
//! by [`InMemoryOrderStore`] for tests and local runs.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use store::OrderStore;

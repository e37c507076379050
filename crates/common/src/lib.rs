//! Shared identifiers and pagination types used across the order service crates.

pub mod page;
pub mod types;

pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page, PageRequest};
pub use types::{OrderId, ProductId, UserId};

//! Cache gateway for order reads.
//!
//! The cache is a disposable read-through accelerator: it has no write path
//! of its own, entries expire after a TTL, and writers invalidate rather than
//! update. [`RedisCache`] is the production backend; [`InMemoryCache`] backs
//! tests and [`DisabledCache`] is used when no cache is configured.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod pattern;
pub mod redis_cache;

pub use error::{CacheError, Result};
pub use gateway::{CacheGateway, CacheGatewayExt, DisabledCache};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;

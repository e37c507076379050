//! The cache gateway trait and its typed JSON helpers.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Result;

/// Key-value cache with per-entry TTL.
///
/// Values are opaque strings; use [`CacheGatewayExt`] for typed JSON values.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Returns the value stored under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key` for `ttl`.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Removes every key matching a glob `pattern` (`*` matches any run of
    /// characters). Returns the number of keys removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Checks that the cache is reachable.
    async fn ping(&self) -> Result<()>;
}

/// Extension trait providing typed JSON access for cache gateways.
#[async_trait]
pub trait CacheGatewayExt: CacheGateway {
    /// Reads and decodes a JSON value.
    ///
    /// An entry that no longer decodes is deleted and reported as a miss.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(key, error = %e, "dropping undecodable cache entry");
                self.delete(key).await?;
                Ok(None)
            }
        }
    }

    /// Encodes a value as JSON and stores it for `ttl`.
    async fn set_json<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(key, raw, ttl).await
    }
}

// Blanket implementation for all CacheGateway implementations
impl<T: CacheGateway + ?Sized> CacheGatewayExt for T {}

/// A cache that never holds anything.
///
/// Used when no cache backend is configured or the backend was unreachable
/// at start-up; reads always miss and writes are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCache;

#[async_trait]
impl CacheGateway for DisabledCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_pattern(&self, _pattern: &str) -> Result<u64> {
        Ok(0)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

//! Port for the persistent key-value store backing the compute cache.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::ports::errors::StoreError;

/// Durable key-value storage with TTL expiry.
///
/// `set_if_absent` is atomic so concurrent processes can coordinate who
/// publishes a freshly computed value; in-process single-flight is handled
/// by the cache layer itself.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get a value if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Store a value with a TTL, overwriting any existing entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError>;

    /// Store a value only if the key is absent. Returns true when the
    /// write took effect.
    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Remove a key.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

//! In-memory key-value store adapter.
//!
//! Default backing for the compute cache when no external store is
//! configured; also the store used throughout the test suite.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::ports::{KeyValueStore, StoreError};

struct Entry {
    value: Value,
    expires_at: Instant,
}

/// TTL-aware in-memory store with atomic `set_if_absent`.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), StoreError> {
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Value,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let live = entries.get(key).is_some_and(|e| e.expires_at > now);
        if live {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_if_absent_is_first_writer_wins() {
        let store = InMemoryKvStore::new();
        assert!(store
            .set_if_absent("k", json!(1), Duration::from_secs(60))
            .await
            .unwrap());
        assert!(!store
            .set_if_absent("k", json!(2), Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_read_as_absent() {
        let store = InMemoryKvStore::new();
        store.set("k", json!(1), Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        // And the key is claimable again.
        assert!(store
            .set_if_absent("k", json!(2), Duration::from_secs(5))
            .await
            .unwrap());
    }
}

//! Time-boxed compute cache with single-flight de-duplication.
//!
//! Wraps expensive, side-effect-bearing computations (language-model
//! calls, aggregate recomputation) behind `get_or_compute`. Concurrent
//! callers for the same key await the one in-flight computation instead
//! of duplicating it; a failed computation propagates to every waiter and
//! leaves the key absent, so the next caller retries.
//!
//! An optional persistent `KeyValueStore` is consulted read-through and
//! written write-through (first writer wins via `set_if_absent`), so a
//! shared store can back the cache across processes. Single-flight itself
//! is in-process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::ports::KeyValueStore;

/// Errors surfaced by `get_or_compute`.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The computation itself failed; delivered to the leader and every
    /// waiter alike. The key stays absent.
    #[error("cached computation failed: {0}")]
    Compute(String),

    /// The in-flight computation was dropped before producing a result
    /// (e.g. its cycle hit the wall-clock budget).
    #[error("in-flight computation was interrupted")]
    Interrupted,
}

type FlightResult = Result<Value, Arc<str>>;

enum Slot {
    Ready { value: Value, expires_at: Instant },
    InFlight { flight: u64, tx: broadcast::Sender<FlightResult> },
}

#[derive(Default)]
struct Shared {
    slots: Mutex<HashMap<String, Slot>>,
    flight_seq: AtomicU64,
}

/// Single-flight TTL cache over opaque serialized payloads.
#[derive(Clone, Default)]
pub struct ComputeCache {
    shared: Arc<Shared>,
    backing: Option<Arc<dyn KeyValueStore>>,
}

/// Removes a stale in-flight slot if the leader is dropped mid-compute,
/// so waiters fail fast and the key becomes retryable.
struct FlightGuard<'a> {
    cache: &'a ComputeCache,
    key: &'a str,
    flight: u64,
    armed: bool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.cache.clear_flight(self.key, self.flight);
        }
    }
}

impl ComputeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache backed by a persistent key-value store.
    pub fn with_backing(backing: Arc<dyn KeyValueStore>) -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            backing: Some(backing),
        }
    }

    /// Return the cached value for `key` if fresh; otherwise run `compute`
    /// exactly once across all concurrent callers, store the result under
    /// `ttl`, and hand it to everyone.
    pub async fn get_or_compute<F>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, CacheError>
    where
        F: std::future::Future<Output = anyhow::Result<Value>> + Send,
    {
        let entry = {
            let mut slots = self.shared.slots.lock().expect("cache mutex");
            match slots.get(key) {
                Some(Slot::Ready { value, expires_at }) if *expires_at > Instant::now() => {
                    debug!(key, "cache hit");
                    return Ok(value.clone());
                }
                Some(Slot::InFlight { tx, .. }) => Err(tx.subscribe()),
                _ => {
                    // Miss or expired: become the leader.
                    let flight = self.shared.flight_seq.fetch_add(1, Ordering::Relaxed);
                    let (tx, _) = broadcast::channel(1);
                    slots.insert(key.to_string(), Slot::InFlight { flight, tx });
                    Ok(flight)
                }
            }
        };

        let flight = match entry {
            Ok(flight) => flight,
            Err(mut rx) => {
                debug!(key, "awaiting in-flight computation");
                return match rx.recv().await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(msg)) => Err(CacheError::Compute(msg.to_string())),
                    Err(_) => Err(CacheError::Interrupted),
                };
            }
        };

        let mut guard = FlightGuard {
            cache: self,
            key,
            flight,
            armed: true,
        };

        debug!(key, "cache miss, computing");
        let result = self.lead(key, flight, ttl, compute).await;
        guard.armed = false;
        drop(guard);
        result
    }

    async fn lead<F>(
        &self,
        key: &str,
        flight: u64,
        ttl: Duration,
        compute: F,
    ) -> Result<Value, CacheError>
    where
        F: std::future::Future<Output = anyhow::Result<Value>> + Send,
    {
        // Read-through: another process may already have the value.
        if let Some(backing) = &self.backing {
            match backing.get(key).await {
                Ok(Some(value)) => {
                    self.finish(key, flight, Ok(value.clone()), ttl);
                    return Ok(value);
                }
                Ok(None) => {}
                Err(err) => debug!(key, %err, "backing store read failed, computing locally"),
            }
        }

        match compute.await {
            Ok(mut value) => {
                if let Some(backing) = &self.backing {
                    // First writer wins across processes; prefer whatever
                    // actually landed in the shared store.
                    match backing.set_if_absent(key, value.clone(), ttl).await {
                        Ok(true) => {}
                        Ok(false) => {
                            if let Ok(Some(stored)) = backing.get(key).await {
                                value = stored;
                            }
                        }
                        Err(err) => warn!(key, %err, "backing store write failed"),
                    }
                }
                self.finish(key, flight, Ok(value.clone()), ttl);
                Ok(value)
            }
            Err(err) => {
                let msg = err.to_string();
                self.finish(key, flight, Err(Arc::from(msg.as_str())), ttl);
                Err(CacheError::Compute(msg))
            }
        }
    }

    /// Publish the flight result: update the slot map, then notify waiters.
    /// Publishes only while `flight` still owns the slot. If the key was
    /// invalidated (and possibly re-led by a newer flight) mid-compute, the
    /// superseded result is dropped instead of overwriting fresher state or
    /// reaching the newer flight's waiters.
    fn finish(&self, key: &str, flight: u64, result: FlightResult, ttl: Duration) {
        let tx = {
            let mut slots = self.shared.slots.lock().expect("cache mutex");
            let owned = matches!(
                slots.get(key),
                Some(Slot::InFlight { flight: f, .. }) if *f == flight
            );
            if !owned {
                return;
            }
            let Some(Slot::InFlight { tx, .. }) = slots.remove(key) else {
                return;
            };
            if let Ok(value) = &result {
                slots.insert(
                    key.to_string(),
                    Slot::Ready {
                        value: value.clone(),
                        expires_at: Instant::now() + ttl,
                    },
                );
            }
            tx
        };
        // No waiters is fine.
        let _ = tx.send(result);
    }

    fn clear_flight(&self, key: &str, flight: u64) {
        let mut slots = self.shared.slots.lock().expect("cache mutex");
        if matches!(slots.get(key), Some(Slot::InFlight { flight: f, .. }) if *f == flight) {
            slots.remove(key);
        }
    }

    /// Drop a key regardless of state. Waiters on an in-flight
    /// computation observe `Interrupted`, and the displaced leader's
    /// eventual result is discarded rather than re-cached.
    pub fn invalidate(&self, key: &str) {
        self.shared.slots.lock().expect("cache mutex").remove(key);
    }

    /// Drop every expired entry.
    pub fn sweep(&self) {
        let now = Instant::now();
        self.shared
            .slots
            .lock()
            .expect("cache mutex")
            .retain(|_, slot| !matches!(slot, Slot::Ready { expires_at, .. } if *expires_at <= now));
    }

    /// Whether a fresh value is present (test/observability helper).
    pub fn contains_fresh(&self, key: &str) -> bool {
        matches!(
            self.shared.slots.lock().expect("cache mutex").get(key),
            Some(Slot::Ready { expires_at, .. }) if *expires_at > Instant::now()
        )
    }
}

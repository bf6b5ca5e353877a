//! Response cache for fleetwise-runtime.
//!
//! Memoizes aggregated responses per `(city, capacity)` so identical
//! requests inside the freshness window skip the upstream fan-out.
//!
//! Freshness is checked on every read against the caller's clock. moka
//! handles storage, the capacity bound and an optional retention sweep;
//! an entry moka still holds is never returned once it is past the TTL.

use moka::future::Cache;
use std::sync::Arc;
use std::time::{Duration, Instant};

use fleetwise_core::{AggregatedResponse, DeliveryRequest};

/// Normalized cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    city: String,
    capacity: String,
}

impl CacheKey {
    pub fn new(city: &str, capacity: u32) -> Self {
        Self {
            city: city.trim().to_lowercase(),
            capacity: capacity.to_string(),
        }
    }

    pub fn from_request(request: &DeliveryRequest) -> Self {
        Self {
            city: request.normalized_city(),
            capacity: request.capacity.to_string(),
        }
    }
}

/// A stored response and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: Arc<AggregatedResponse>,
    pub stored_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Aggregated-response cache using moka.
pub struct ResponseCache {
    cache: Cache<CacheKey, CacheEntry>,
}

impl ResponseCache {
    /// Bounded cache with lazy expiry only.
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_entries).build();
        Self { cache }
    }

    /// Bounded cache that also drops entries `retention` after insertion.
    pub fn with_retention(max_entries: u64, retention: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(retention)
            .build();
        Self { cache }
    }

    /// Fresh response for `key`, if any.
    pub async fn get(
        &self,
        key: &CacheKey,
        now: Instant,
        ttl: Duration,
    ) -> Option<Arc<AggregatedResponse>> {
        self.cache
            .get(key)
            .await
            .filter(|entry| entry.is_fresh(now, ttl))
            .map(|entry| entry.response)
    }

    /// Store a response, replacing any previous one for the key.
    pub async fn put(&self, key: CacheKey, response: Arc<AggregatedResponse>, now: Instant) {
        self.cache
            .insert(
                key,
                CacheEntry {
                    response,
                    stored_at: now,
                },
            )
            .await;
    }

    /// Stored entry regardless of freshness.
    pub async fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.cache.get(key).await
    }

    /// Number of stored entries, fresh or not.
    pub async fn len(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

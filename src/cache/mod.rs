//! Key-value cache collaborator for provider-response memoization.
//!
//! The cache is advisory: a miss is never an error, only a cost (one more
//! provider call). Writes are idempotent — the same key always maps to the
//! same serialized record — so no locking is required beyond what the
//! backend provides for individual key operations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

/// Cache contract used by the ingestion pipeline.
///
/// The batched variants exist for provider-result caching, where one job
/// reads and writes hundreds of keys per checkpoint.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads one key. Expired or absent entries are a miss.
    async fn get(&self, key: &str) -> Option<String>;

    /// Writes one key with a time-to-live.
    async fn set(&self, key: &str, value: String, ttl: Duration);

    /// Reads many keys; the result is positionally aligned with `keys`.
    async fn get_many(&self, keys: &[String]) -> Vec<Option<String>>;

    /// Writes many entries with one shared time-to-live.
    async fn set_many(&self, entries: Vec<(String, String)>, ttl: Duration);
}

/// In-process cache backed by a concurrent map with per-entry expiry.
///
/// The default runtime backend, and the test backend. A networked store can
/// replace it behind the [`Cache`] trait without touching the pipeline.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, CacheEntry>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty cache behind an `Arc`, ready to share with workers.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let hit = self.entries.get(key).and_then(|entry| {
            if entry.expires_at > now {
                Some(entry.value.clone())
            } else {
                None
            }
        });

        if hit.is_none() {
            // Evict lazily so expired entries don't accumulate.
            self.entries
                .remove_if(key, |_, entry| entry.expires_at <= now);
        }

        debug!(key, hit = hit.is_some(), "cache read");
        hit
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn get_many(&self, keys: &[String]) -> Vec<Option<String>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await);
        }
        results
    }

    async fn set_many(&self, entries: Vec<(String, String)>, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        for (key, value) in entries {
            self.entries.insert(key, CacheEntry { value, expires_at });
        }
    }
}

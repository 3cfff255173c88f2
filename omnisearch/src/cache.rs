//! In-memory TTL cache of per-source results.
//!
//! Entries are keyed by `(source_id, JSON(query))` so two queries only
//! share an entry when every field (filters, limit, offset) matches. Uses
//! [`moka`] for async-friendly caching; expiry is checked on read and the
//! entry count is bounded so long-lived processes do not grow without limit.

use chrono::{DateTime, Utc};
use std::time::Duration;

use moka::future::Cache;

use crate::types::{SearchQuery, SourceResult};

/// Composite cache key: source id + serialised query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    source_id: String,
    query: String,
}

impl CacheKey {
    /// Build a deterministic cache key for one source and query.
    pub fn new(source_id: &str, query: &SearchQuery) -> Self {
        // Serialising a plain struct of strings, numbers and vectors cannot
        // fail; fall back to the bare query text if it ever does.
        let query = serde_json::to_string(query).unwrap_or_else(|_| query.query.clone());
        Self {
            source_id: source_id.to_owned(),
            query,
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }
}

/// A cached result set and when it was stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub results: Vec<SourceResult>,
    pub timestamp: DateTime<Utc>,
}

/// TTL cache of source results. Process-lifetime only.
#[derive(Clone)]
pub struct ResultCache {
    inner: Option<Cache<CacheKey, CacheEntry>>,
}

impl ResultCache {
    /// Build a cache. A zero TTL disables caching entirely.
    pub fn new(ttl_seconds: u64, max_entries: u64) -> Self {
        let inner = (ttl_seconds > 0).then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build()
        });
        Self { inner }
    }

    /// Build a cache with a sub-second TTL.
    pub fn with_ttl(ttl: Duration, max_entries: u64) -> Self {
        let inner = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build()
        });
        Self { inner }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up unexpired results for the given key.
    pub async fn get(&self, key: &CacheKey) -> Option<Vec<SourceResult>> {
        let cache = self.inner.as_ref()?;
        cache.get(key).await.map(|entry| entry.results)
    }

    /// Store results, replacing any previous entry for the key.
    pub async fn insert(&self, key: CacheKey, results: Vec<SourceResult>) {
        if let Some(cache) = &self.inner {
            let entry = CacheEntry {
                results,
                timestamp: Utc::now(),
            };
            cache.insert(key, entry).await;
        }
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }

    /// Approximate number of live entries.
    pub async fn entry_count(&self) -> u64 {
        match &self.inner {
            Some(cache) => {
                cache.run_pending_tasks().await;
                cache.entry_count()
            }
            None => 0,
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

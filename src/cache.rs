//! Time-bounded memoization of search outcomes.
//!
//! Keyed by (tenant, normalized query, filter fingerprint). An entry is
//! never served past `created_at + ttl`; expired entries are evicted
//! lazily on lookup, and the server may additionally run a periodic
//! [`ResultCache::purge_expired`] sweep.
//!
//! Store writes do NOT invalidate matching entries: staleness up to the
//! TTL window is an accepted trade-off, not a bug. There is also no
//! single-flight guarantee: concurrent misses for one key may each
//! recompute, which is acceptable because search is read-only and
//! idempotent.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::models::{SearchFilters, SearchOutcome};

/// Cache key: tenant, normalized query, and a fingerprint of the
/// filters. Normalization lowercases and trims the query so trivial
/// variations share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    tenant: String,
    query: String,
    filters_fingerprint: String,
}

impl CacheKey {
    pub fn new(tenant: &str, query: &str, filters: &SearchFilters) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(filters.canonical().as_bytes());
        Self {
            tenant: tenant.to_string(),
            query: query.trim().to_lowercase(),
            filters_fingerprint: format!("{:x}", hasher.finalize()),
        }
    }
}

/// One memoized outcome with its expiry window.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    results: SearchOutcome,
    created_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(results: SearchOutcome, ttl: Duration) -> Self {
        Self {
            results,
            created_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created_at) >= self.ttl
    }
}

/// Concurrent TTL cache in front of the search engine.
pub struct ResultCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Return the cached outcome for `key`, or run `compute`, store the
    /// result, and return it.
    ///
    /// Degraded outcomes are not cached; a transient store failure must
    /// not pin an empty result set for a whole TTL window.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> SearchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SearchOutcome>,
    {
        if let Some(hit) = self.lookup(&key) {
            debug!(tenant = %key.tenant, query = %key.query, "cache hit");
            return hit;
        }

        let outcome = compute().await;
        if !outcome.degraded {
            let mut entries = self.entries.write().unwrap();
            entries.insert(key, CacheEntry::new(outcome.clone(), self.ttl));
        }
        outcome
    }

    /// Lock-read lookup with lazy eviction of an expired entry.
    fn lookup(&self, key: &CacheKey) -> Option<SearchOutcome> {
        let expired = {
            let entries = self.entries.read().unwrap();
            match entries.get(key) {
                Some(entry) if !entry.is_expired(Instant::now()) => {
                    return Some(entry.results.clone());
                }
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.entries.write().unwrap().remove(key);
        }
        None
    }

    /// Drop every expired entry. Intended for a periodic background
    /// sweep; safe to call concurrently with lookups.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap();
        entries.retain(|_, entry| !entry.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

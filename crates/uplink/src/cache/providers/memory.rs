//! # Memory Cache Provider
//!
//! This module provides an in-memory cache implementation using Moka caching.
//! The synchronous Moka cache is used so that blocking readers can be served
//! without a runtime.

use moka::sync::Cache as MokaCache;
use tracing::{debug, warn};

use crate::cache::providers::CacheProvider;
use crate::cache::types::{
    CacheEntry, CacheLookupResult, CacheMetadata, CacheResult, CacheStatus, now_millis,
};
use crate::key::Fingerprint;

/// Entry in the memory cache
#[derive(Clone)]
struct StoredEntry {
    entry: CacheEntry,
    metadata: CacheMetadata,
}

/// Memory cache provider implementation using Moka
#[derive(Clone)]
pub struct MemoryCache {
    cache: MokaCache<Fingerprint, StoredEntry>,
    max_size: u64,
}

impl MemoryCache {
    /// Create a new memory cache with the specified size limit
    ///
    /// # Panics
    ///
    /// Panics if `max_size_bytes` is zero.
    pub fn new(max_size_bytes: u64) -> Self {
        if max_size_bytes == 0 {
            panic!("Memory cache size must be greater than zero");
        }

        let cache = MokaCache::builder()
            .weigher(|_k, v: &StoredEntry| v.metadata.size.try_into().unwrap_or(u32::MAX))
            .max_capacity(max_size_bytes)
            .build();

        debug!(max_size = max_size_bytes, "Memory cache created");

        Self {
            cache,
            max_size: max_size_bytes,
        }
    }

    /// Synchronous insert, used by the store so the memory tier is populated
    /// before an asynchronous write returns to the caller.
    ///
    /// Returns `false` when the entry exceeds the cache capacity and was not
    /// stored.
    pub fn put_blocking(
        &self,
        key: Fingerprint,
        entry: CacheEntry,
        metadata: CacheMetadata,
    ) -> bool {
        if metadata.size > self.max_size {
            warn!(
                key = %key,
                size = metadata.size,
                max_size = self.max_size,
                "Entry too large for memory cache, skipping"
            );
            return false;
        }
        self.cache.insert(key, StoredEntry { entry, metadata });
        true
    }

    pub fn remove_blocking(&self, key: &Fingerprint) {
        self.cache.invalidate(key);
    }

    /// Drop every entry present at the time of the call
    pub fn clear_blocking(&self) {
        for (key, _) in self.cache.iter() {
            self.cache.invalidate(&*key);
        }
        self.cache.invalidate_all();
    }

    fn lookup(&self, key: &Fingerprint) -> CacheLookupResult {
        let Some(stored) = self.cache.get(key) else {
            return Ok(None);
        };

        if stored.metadata.is_expired_at(now_millis()) {
            debug!(key = %key, "Memory cache entry expired");
            self.cache.invalidate(key);
            return Ok(Some((stored.entry, stored.metadata, CacheStatus::Expired)));
        }

        Ok(Some((stored.entry, stored.metadata, CacheStatus::Hit)))
    }
}

#[async_trait::async_trait]
impl CacheProvider for MemoryCache {
    async fn contains(&self, key: &Fingerprint) -> CacheResult<bool> {
        Ok(self.cache.contains_key(key))
    }

    async fn get(&self, key: &Fingerprint) -> CacheLookupResult {
        self.lookup(key)
    }

    fn get_blocking(&self, key: &Fingerprint) -> CacheLookupResult {
        self.lookup(key)
    }

    async fn put(
        &self,
        key: Fingerprint,
        entry: CacheEntry,
        metadata: CacheMetadata,
    ) -> CacheResult<()> {
        self.put_blocking(key, entry, metadata);
        Ok(())
    }

    async fn remove(&self, key: &Fingerprint) -> CacheResult<()> {
        self.cache.invalidate(key);
        Ok(())
    }

    async fn clear(&self) -> CacheResult<()> {
        self.clear_blocking();
        debug!("Memory cache cleared");
        Ok(())
    }

    async fn is_expired(&self, key: &Fingerprint) -> CacheResult<bool> {
        Ok(self
            .cache
            .get(key)
            .is_some_and(|stored| stored.metadata.is_expired()))
    }
}

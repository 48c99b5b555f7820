//! # Cache Provider
//!
//! This module defines the cache provider trait that all cache implementations must follow.

use async_trait::async_trait;

use crate::cache::types::{CacheEntry, CacheLookupResult, CacheMetadata, CacheResult};
use crate::key::Fingerprint;

/// A trait for cache providers that can store and retrieve cached payloads
#[async_trait]
pub trait CacheProvider: Send + Sync {
    /// Check if the cache contains an entry for the given key
    async fn contains(&self, key: &Fingerprint) -> CacheResult<bool>;

    /// Get an entry from the cache. Expired entries are reported as
    /// [`CacheStatus::Expired`](crate::cache::CacheStatus) and removed.
    async fn get(&self, key: &Fingerprint) -> CacheLookupResult;

    /// Blocking variant of [`CacheProvider::get`] for synchronous readers
    fn get_blocking(&self, key: &Fingerprint) -> CacheLookupResult;

    /// Put an entry into the cache
    async fn put(
        &self,
        key: Fingerprint,
        entry: CacheEntry,
        metadata: CacheMetadata,
    ) -> CacheResult<()>;

    /// Remove an entry from the cache
    async fn remove(&self, key: &Fingerprint) -> CacheResult<()>;

    /// Clear all entries from the cache
    async fn clear(&self) -> CacheResult<()>;

    /// Whether the entry for `key` exists and has passed its expiry
    async fn is_expired(&self, key: &Fingerprint) -> CacheResult<bool>;
}

//! # Cache System
//!
//! This module provides an expiry-aware payload cache keyed by request
//! fingerprint, backed by an in-memory tier and an optional file tier.

// Module declarations
mod manager;
pub mod providers;
mod types;

// Re-export primary types from our various modules
pub use manager::CacheStore;
pub use types::{
    CacheConfig, CacheEntry, CacheLookupResult, CacheMetadata, CacheResult, CacheStatus, Expiry,
    PERCENT_KEY,
};

pub use providers::{CacheProvider, FileCache, MemoryCache};

//! # Cache Providers
//!
//! Storage tiers behind the cache store: a moka-backed memory tier and a
//! directory of JSON envelopes on disk.

pub mod file;
pub mod memory;
pub mod provider;

pub use self::file::FileCache;
pub use self::memory::MemoryCache;
pub use self::provider::CacheProvider;

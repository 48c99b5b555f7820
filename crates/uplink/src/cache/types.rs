//! # Cache Types
//!
//! This module defines common types used across the caching system.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Secondary payload name under which a completed upload records its progress
pub const PERCENT_KEY: &str = "percent";

/// Milliseconds since the unix epoch
pub(crate) fn now_millis() -> u64 {
    millis(SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default())
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Status of a cached resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Resource found in cache and is valid
    Hit,
    /// Resource found but has expired
    Expired,
}

/// When entries written under a configuration stop being valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiry {
    /// Entries never expire
    #[default]
    Never,
    /// Entries expire a fixed duration after they were written
    After(Duration),
    /// Entries expire at a fixed point in time
    At(SystemTime),
}

impl Expiry {
    /// Absolute expiry in epoch milliseconds for an entry written at `written_at`
    pub fn deadline(&self, written_at: u64) -> Option<u64> {
        match self {
            Expiry::Never => None,
            Expiry::After(ttl) => Some(written_at.saturating_add(millis(*ttl))),
            Expiry::At(at) => Some(millis(at.duration_since(UNIX_EPOCH).unwrap_or_default())),
        }
    }
}

/// A cached payload bundle: an optional primary blob plus named secondary blobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(with = "base64_bytes::option", default)]
    pub data: Option<Bytes>,
    #[serde(with = "base64_bytes::map", default)]
    pub data_map: Option<HashMap<String, Bytes>>,
}

impl CacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: impl Into<Bytes>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_part(mut self, name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.data_map
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), data.into());
        self
    }

    pub fn part(&self, name: &str) -> Option<&Bytes> {
        self.data_map.as_ref().and_then(|m| m.get(name))
    }

    /// Record of a finished upload: the response body plus a full progress marker
    pub fn completion(body: impl Into<Bytes>) -> Self {
        Self::new()
            .with_data(body)
            .with_part(PERCENT_KEY, Bytes::from_static(b"1"))
    }

    /// Progress fraction recorded in this entry, if any
    pub fn percent(&self) -> Option<f64> {
        let raw = self.part(PERCENT_KEY)?;
        std::str::from_utf8(raw).ok()?.trim().parse().ok()
    }

    /// Total payload size in bytes
    pub fn size(&self) -> u64 {
        let primary = self.data.as_ref().map_or(0, |d| d.len());
        let secondary: usize = self
            .data_map
            .as_ref()
            .map_or(0, |m| m.values().map(|v| v.len()).sum());
        (primary + secondary) as u64
    }
}

/// Metadata for a cached resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// When the resource was cached (epoch millis)
    pub cached_at: u64,
    /// When the resource expires (epoch millis)
    pub expires_at: Option<u64>,
    /// Size of the cached payloads in bytes
    pub size: u64,
}

impl CacheMetadata {
    /// Create new metadata for a resource
    pub fn new(size: u64) -> Self {
        Self {
            cached_at: now_millis(),
            expires_at: None,
            size,
        }
    }

    /// Apply an expiry policy relative to the write time
    pub fn with_expiry(mut self, expiry: &Expiry) -> Self {
        self.expires_at = expiry.deadline(self.cached_at);
        self
    }

    /// Check if the resource has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_millis())
    }

    pub fn is_expired_at(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|expires_at| now >= expires_at)
    }
}

/// Configuration for the cache system
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// Storage name, used as the directory name under the temp dir
    pub name: String,
    /// Path for disk cache storage
    pub disk_cache_path: Option<PathBuf>,
    /// Whether entries are persisted to disk
    pub disk_enabled: bool,
    /// Maximum size of memory cache in bytes
    pub max_memory_cache_size: u64,
    /// Expiry applied to every entry written under this configuration
    pub expiry: Expiry,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: "uplink-cache".to_owned(),
            disk_cache_path: None, // If None, we'll use system temp dir
            disk_enabled: true,
            max_memory_cache_size: 30 * 1024 * 1024, // 30MB
            expiry: Expiry::Never,
        }
    }
}

impl CacheConfig {
    /// A configuration that never touches the filesystem
    pub fn memory_only() -> Self {
        Self {
            disk_enabled: false,
            ..Self::default()
        }
    }

    pub fn with_expiry(mut self, expiry: Expiry) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_disk_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.disk_cache_path = Some(path.into());
        self
    }

    /// Directory used by the file tier
    pub fn resolved_disk_path(&self) -> PathBuf {
        self.disk_cache_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(&self.name))
    }
}

/// Result of a cache operation
pub type CacheResult<T> = std::result::Result<T, std::io::Error>;

/// A type representing the result of a cache lookup operation
pub type CacheLookupResult = CacheResult<Option<(CacheEntry, CacheMetadata, CacheStatus)>>;

/// Payloads are kept as base64 strings inside the JSON envelope.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;

    fn decode<E: serde::de::Error>(s: &str) -> Result<bytes::Bytes, E> {
        STANDARD.decode(s).map(bytes::Bytes::from).map_err(E::custom)
    }

    pub mod option {
        use bytes::Bytes;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::STANDARD;
        use base64::Engine;

        pub fn serialize<S: Serializer>(value: &Option<Bytes>, s: S) -> Result<S::Ok, S::Error> {
            value.as_ref().map(|b| STANDARD.encode(b)).serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Bytes>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|s| super::decode::<D::Error>(&s))
                .transpose()
        }
    }

    pub mod map {
        use std::collections::{BTreeMap, HashMap};

        use bytes::Bytes;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::STANDARD;
        use base64::Engine;

        pub fn serialize<S: Serializer>(
            value: &Option<HashMap<String, Bytes>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            value
                .as_ref()
                .map(|m| {
                    m.iter()
                        .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
                        .collect::<BTreeMap<_, _>>()
                })
                .serialize(s)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<HashMap<String, Bytes>>, D::Error> {
            Option::<HashMap<String, String>>::deserialize(d)?
                .map(|m| {
                    m.into_iter()
                        .map(|(k, v)| super::decode::<D::Error>(&v).map(|b| (k, b)))
                        .collect()
                })
                .transpose()
        }
    }
}

//! # Cache Store
//!
//! Coordinates the memory and file tiers behind a get/set/remove/expire
//! contract. Reads are available both blocking and async; writes are
//! fire-and-forget and report their outcome through a [`JoinHandle`].
//!
//! Expired entries are deleted lazily by the read that finds them. There is no
//! background sweep.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::cache::providers::file::FileCache;
use crate::cache::providers::memory::MemoryCache;
use crate::cache::providers::provider::CacheProvider;
use crate::cache::types::{CacheConfig, CacheEntry, CacheMetadata, CacheStatus, Expiry};
use crate::error::CacheError;
use crate::key::Fingerprint;

/// Live storage built from one configuration
struct Backend {
    memory: MemoryCache,
    file: Option<FileCache>,
    expiry: Expiry,
}

impl Backend {
    fn build(config: &CacheConfig) -> Result<Self, CacheError> {
        if config.max_memory_cache_size == 0 {
            return Err(CacheError::Config(
                "max_memory_cache_size must be greater than zero".to_owned(),
            ));
        }

        let memory = MemoryCache::new(config.max_memory_cache_size);
        let file = if config.disk_enabled {
            Some(FileCache::open(config.resolved_disk_path())?)
        } else {
            None
        };

        Ok(Self {
            memory,
            file,
            expiry: config.expiry,
        })
    }

    fn lookup_blocking(&self, key: &Fingerprint) -> Option<CacheEntry> {
        match self.memory.get_blocking(key) {
            Ok(Some((entry, _, CacheStatus::Hit))) => return Some(entry),
            Ok(Some((_, _, CacheStatus::Expired))) => {
                // The file copy carries the same deadline
                if let Some(file) = &self.file {
                    if let Err(e) = file.remove_blocking(key) {
                        warn!(key = %key, error = %e, "Failed to remove expired file entry");
                    }
                }
                return None;
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Memory cache read failed"),
        }

        let file = self.file.as_ref()?;
        match file.get_blocking(key) {
            Ok(Some((entry, metadata, CacheStatus::Hit))) => {
                self.memory.put_blocking(key.clone(), entry.clone(), metadata);
                Some(entry)
            }
            Ok(Some((_, _, CacheStatus::Expired))) | Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "File cache read failed");
                None
            }
        }
    }

    async fn lookup(&self, key: &Fingerprint) -> Option<CacheEntry> {
        match self.memory.get(key).await {
            Ok(Some((entry, _, CacheStatus::Hit))) => return Some(entry),
            Ok(Some((_, _, CacheStatus::Expired))) => {
                if let Some(file) = &self.file {
                    if let Err(e) = file.remove(key).await {
                        warn!(key = %key, error = %e, "Failed to remove expired file entry");
                    }
                }
                return None;
            }
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Memory cache read failed"),
        }

        let file = self.file.as_ref()?;
        match file.get(key).await {
            Ok(Some((entry, metadata, CacheStatus::Hit))) => {
                self.memory.put_blocking(key.clone(), entry.clone(), metadata);
                Some(entry)
            }
            Ok(Some((_, _, CacheStatus::Expired))) | Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "File cache read failed");
                None
            }
        }
    }
}

/// Expiry-aware payload store keyed by request fingerprint
#[derive(Clone)]
pub struct CacheStore {
    config: Arc<RwLock<CacheConfig>>,
    backend: Arc<RwLock<Option<Arc<Backend>>>>,
}

impl CacheStore {
    /// Create a store from `config`.
    ///
    /// A configuration that cannot be applied leaves the store inert: every
    /// read misses and every write reports failure.
    pub fn new(config: CacheConfig) -> Self {
        let store = Self {
            config: Arc::new(RwLock::new(config)),
            backend: Arc::new(RwLock::new(None)),
        };
        let expiry = store.config.read().expiry;
        let _ = store.configure(expiry);
        store
    }

    /// A store that only keeps entries in memory
    pub fn in_memory() -> Self {
        Self::new(CacheConfig::memory_only())
    }

    /// (Re)initialize the storage with `expiry`.
    ///
    /// The policy applies to entries written after this call. On failure the
    /// error is logged, the store becomes inert and the error is returned.
    pub fn configure(&self, expiry: Expiry) -> Result<(), CacheError> {
        let config = {
            let mut config = self.config.write();
            config.expiry = expiry;
            config.clone()
        };
        self.apply(&config)
    }

    /// Replace the whole configuration and rebuild the storage
    pub fn reconfigure(&self, config: CacheConfig) -> Result<(), CacheError> {
        *self.config.write() = config.clone();
        self.apply(&config)
    }

    fn apply(&self, config: &CacheConfig) -> Result<(), CacheError> {
        if !config.enabled {
            debug!("Cache disabled by configuration");
            *self.backend.write() = None;
            return Ok(());
        }

        match Backend::build(config) {
            Ok(backend) => {
                debug!(
                    name = %config.name,
                    disk = config.disk_enabled,
                    expiry = ?config.expiry,
                    "Cache storage configured"
                );
                *self.backend.write() = Some(Arc::new(backend));
                Ok(())
            }
            Err(e) => {
                error!(name = %config.name, error = %e, "Failed to configure cache storage");
                *self.backend.write() = None;
                Err(e)
            }
        }
    }

    fn backend(&self) -> Option<Arc<Backend>> {
        self.backend.read().clone()
    }

    /// Whether the store has usable storage
    pub fn is_active(&self) -> bool {
        self.backend.read().is_some()
    }

    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    /// Read an entry, blocking on disk access if the memory tier misses.
    ///
    /// An expired entry is deleted and reported as a miss. Storage errors are
    /// logged and also reported as a miss.
    pub fn get(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.backend()?.lookup_blocking(key)
    }

    /// Async counterpart of [`CacheStore::get`]
    pub async fn get_async(&self, key: &Fingerprint) -> Option<CacheEntry> {
        self.backend()?.lookup(key).await
    }

    /// Whether an entry exists for `key` and has passed its expiry
    pub async fn is_expired(&self, key: &Fingerprint) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };
        if backend.memory.is_expired(key).await.unwrap_or(false) {
            return true;
        }
        match &backend.file {
            Some(file) => file.is_expired(key).await.unwrap_or_else(|e| {
                warn!(key = %key, error = %e, "Failed to read cache metadata");
                false
            }),
            None => false,
        }
    }

    /// Whether a completion record with `percent == 1` is stored for `key`
    pub fn is_complete(&self, key: &Fingerprint) -> bool {
        self.get(key)
            .and_then(|entry| entry.percent())
            .is_some_and(|percent| percent == 1.0)
    }

    pub async fn contains(&self, key: &Fingerprint) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };
        if backend.memory.contains(key).await.unwrap_or(false) {
            return true;
        }
        match &backend.file {
            Some(file) => file.contains(key).await.unwrap_or(false),
            None => false,
        }
    }

    /// Store `entry` under `key` with the configured expiry.
    ///
    /// The memory tier is updated before this returns; the disk write runs in
    /// the background. Must be called from within a Tokio runtime.
    pub fn set(&self, key: Fingerprint, entry: CacheEntry) -> JoinHandle<bool> {
        let Some(backend) = self.backend() else {
            return tokio::spawn(async { false });
        };

        let metadata = CacheMetadata::new(entry.size()).with_expiry(&backend.expiry);
        let in_memory = backend
            .memory
            .put_blocking(key.clone(), entry.clone(), metadata.clone());

        tokio::spawn(async move {
            let Some(file) = &backend.file else {
                return in_memory;
            };
            match file.put(key.clone(), entry, metadata).await {
                Ok(()) => {
                    debug!(key = %key, "Cached entry");
                    true
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to cache entry");
                    false
                }
            }
        })
    }

    /// Remove the entry for `key` from both tiers.
    ///
    /// The memory copy is dropped before this returns and again once the file
    /// is gone, since a read in between can promote the file copy back.
    pub fn remove(&self, key: &Fingerprint) -> JoinHandle<bool> {
        let Some(backend) = self.backend() else {
            return tokio::spawn(async { false });
        };

        backend.memory.remove_blocking(key);
        let key = key.clone();
        tokio::spawn(async move {
            let Some(file) = &backend.file else {
                return true;
            };
            let removed = file.remove(&key).await.is_ok();
            backend.memory.remove_blocking(&key);
            removed
        })
    }

    /// Remove every entry regardless of key
    pub fn remove_all(&self) -> JoinHandle<bool> {
        let Some(backend) = self.backend() else {
            return tokio::spawn(async { false });
        };

        backend.memory.clear_blocking();
        tokio::spawn(async move {
            let file_result = match &backend.file {
                Some(file) => file.clear().await,
                None => Ok(()),
            };
            let mem_result = backend.memory.clear().await;
            match file_result.and(mem_result) {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "Failed to clear cache");
                    false
                }
            }
        })
    }
}

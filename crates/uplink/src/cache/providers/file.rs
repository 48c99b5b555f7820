//! # File Cache
//!
//! This module implements a file-based persistent cache provider.
//!
//! Every entry is stored as two files named after its fingerprint: a JSON
//! envelope holding the payloads and a `.meta` sidecar holding the expiry
//! metadata. Writes go through temporary files and a rename.

use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io;
use tracing::{debug, warn};

use crate::cache::types::{
    CacheEntry, CacheLookupResult, CacheMetadata, CacheResult, CacheStatus,
};
use crate::key::Fingerprint;

use super::CacheProvider;

#[derive(Debug, Clone)]
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    /// Open (and create if needed) a file cache rooted at `cache_dir`
    pub fn open(cache_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        debug!(dir = ?cache_dir, "File cache opened");
        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Get the path for a cached payload envelope
    fn get_cache_path(&self, key: &Fingerprint) -> PathBuf {
        self.cache_dir.join(format!("{key}.json"))
    }

    /// Get the metadata path for a cached resource
    fn get_metadata_path(&self, key: &Fingerprint) -> PathBuf {
        self.cache_dir.join(format!("{key}.meta"))
    }

    fn decode(
        data_path: &Path,
        meta_path: &Path,
        metadata_bytes: &[u8],
        data_bytes: &[u8],
    ) -> Option<(CacheEntry, CacheMetadata)> {
        let metadata: CacheMetadata = match serde_json::from_slice(metadata_bytes) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = ?meta_path, error = %e, "Failed to parse cache metadata");
                return None;
            }
        };
        let entry: CacheEntry = match serde_json::from_slice(data_bytes) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = ?data_path, error = %e, "Failed to parse cache envelope");
                return None;
            }
        };
        Some((entry, metadata))
    }

    /// Delete both files for `key` without a runtime. Missing files are not
    /// an error.
    pub fn remove_blocking(&self, key: &Fingerprint) -> CacheResult<()> {
        let data_path = self.get_cache_path(key);
        let meta_path = self.get_metadata_path(key);

        let data_result = std::fs::remove_file(&data_path);
        let meta_result = std::fs::remove_file(&meta_path);
        removal_outcome(&data_path, data_result, &meta_path, meta_result)
    }

    async fn remove_files(&self, key: &Fingerprint) -> CacheResult<()> {
        let data_path = self.get_cache_path(key);
        let meta_path = self.get_metadata_path(key);

        // We don't care if the files don't exist
        let data_result = fs::remove_file(&data_path).await;
        let meta_result = fs::remove_file(&meta_path).await;
        removal_outcome(&data_path, data_result, &meta_path, meta_result)
    }
}

fn removal_outcome(
    data_path: &Path,
    data_result: io::Result<()>,
    meta_path: &Path,
    meta_result: io::Result<()>,
) -> CacheResult<()> {
    match (data_result, meta_result) {
        (Err(e), _) if e.kind() != io::ErrorKind::NotFound => {
            warn!(path = ?data_path, error = %e, "Failed to remove cache data file");
            Err(e)
        }
        (_, Err(e)) if e.kind() != io::ErrorKind::NotFound => {
            warn!(path = ?meta_path, error = %e, "Failed to remove cache metadata file");
            Err(e)
        }
        _ => Ok(()),
    }
}

fn read_optional_blocking(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

async fn read_optional(path: &Path) -> CacheResult<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl CacheProvider for FileCache {
    async fn contains(&self, key: &Fingerprint) -> CacheResult<bool> {
        let data_exists = fs::try_exists(self.get_cache_path(key)).await?;
        let meta_exists = fs::try_exists(self.get_metadata_path(key)).await?;
        Ok(data_exists && meta_exists)
    }

    async fn get(&self, key: &Fingerprint) -> CacheLookupResult {
        let data_path = self.get_cache_path(key);
        let meta_path = self.get_metadata_path(key);

        let Some(metadata_bytes) = read_optional(&meta_path).await? else {
            return Ok(None);
        };
        let Some(data_bytes) = read_optional(&data_path).await? else {
            return Ok(None);
        };

        let Some((entry, metadata)) =
            Self::decode(&data_path, &meta_path, &metadata_bytes, &data_bytes)
        else {
            // Corrupt entries are dropped
            let _ = self.remove_files(key).await;
            return Ok(None);
        };

        if metadata.is_expired() {
            self.remove_files(key).await?;
            return Ok(Some((entry, metadata, CacheStatus::Expired)));
        }

        Ok(Some((entry, metadata, CacheStatus::Hit)))
    }

    fn get_blocking(&self, key: &Fingerprint) -> CacheLookupResult {
        let data_path = self.get_cache_path(key);
        let meta_path = self.get_metadata_path(key);

        let Some(metadata_bytes) = read_optional_blocking(&meta_path)? else {
            return Ok(None);
        };
        let Some(data_bytes) = read_optional_blocking(&data_path)? else {
            return Ok(None);
        };

        let Some((entry, metadata)) =
            Self::decode(&data_path, &meta_path, &metadata_bytes, &data_bytes)
        else {
            // Corrupt entries are dropped
            let _ = self.remove_blocking(key);
            return Ok(None);
        };

        if metadata.is_expired() {
            self.remove_blocking(key)?;
            return Ok(Some((entry, metadata, CacheStatus::Expired)));
        }

        Ok(Some((entry, metadata, CacheStatus::Hit)))
    }

    async fn put(
        &self,
        key: Fingerprint,
        entry: CacheEntry,
        metadata: CacheMetadata,
    ) -> CacheResult<()> {
        let data_path = self.get_cache_path(&key);
        let meta_path = self.get_metadata_path(&key);

        fs::create_dir_all(&self.cache_dir).await?;

        let envelope_json = serde_json::to_vec(&entry).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize cache envelope: {e}"),
            )
        })?;
        let metadata_json = serde_json::to_vec(&metadata).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Failed to serialize metadata: {e}"),
            )
        })?;

        // First write to temporary files then rename
        let temp_data_path = data_path.with_extension("json.tmp");
        let temp_meta_path = meta_path.with_extension("meta.tmp");

        if let Err(e) = fs::write(&temp_data_path, &envelope_json).await {
            warn!(path = ?temp_data_path, error = %e, "Failed to write cache data file");
            return Err(e);
        }

        if let Err(e) = fs::write(&temp_meta_path, &metadata_json).await {
            warn!(path = ?temp_meta_path, error = %e, "Failed to write cache metadata file");
            let _ = fs::remove_file(&temp_data_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_data_path, &data_path).await {
            warn!(
                from = ?temp_data_path,
                to = ?data_path,
                error = %e,
                "Failed to rename temporary data file"
            );
            let _ = fs::remove_file(&temp_data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        if let Err(e) = fs::rename(&temp_meta_path, &meta_path).await {
            warn!(
                from = ?temp_meta_path,
                to = ?meta_path,
                error = %e,
                "Failed to rename temporary metadata file"
            );
            // Data landed without metadata, drop both
            let _ = fs::remove_file(&data_path).await;
            let _ = fs::remove_file(&temp_meta_path).await;
            return Err(e);
        }

        debug!(key = %key, "Successfully cached entry to file");
        Ok(())
    }

    async fn remove(&self, key: &Fingerprint) -> CacheResult<()> {
        self.remove_files(key).await
    }

    async fn clear(&self) -> CacheResult<()> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                fs::create_dir_all(&self.cache_dir).await?;
                return Ok(());
            }
            Err(e) => {
                warn!(dir = ?self.cache_dir, error = %e, "Failed to read cache directory");
                return Err(e);
            }
        };

        let mut entry_count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            match result {
                Ok(()) => entry_count += 1,
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to remove cache file");
                    return Err(e);
                }
            }
        }

        debug!(count = entry_count, "Cleared cache entries");
        Ok(())
    }

    async fn is_expired(&self, key: &Fingerprint) -> CacheResult<bool> {
        let Some(metadata_bytes) = read_optional(&self.get_metadata_path(key)).await? else {
            return Ok(false);
        };
        let metadata: CacheMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(metadata.is_expired())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::Expiry;
    use bytes::Bytes;
    use std::time::Duration;

    fn key(name: &str) -> Fingerprint {
        Fingerprint::from_hex(name)
    }

    fn sample() -> (CacheEntry, CacheMetadata) {
        let entry = CacheEntry::new()
            .with_data(Bytes::from_static(b"primary"))
            .with_part("thumb", Bytes::from_static(b"\x00\x01"));
        let metadata = CacheMetadata::new(entry.size());
        (entry, metadata)
    }

    #[tokio::test]
    async fn test_put_then_get_async_and_blocking() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        let (entry, metadata) = sample();

        cache.put(key("k1"), entry.clone(), metadata.clone()).await.unwrap();
        assert!(cache.contains(&key("k1")).await.unwrap());

        let (e, m, status) = cache.get(&key("k1")).await.unwrap().unwrap();
        assert_eq!((e, m, status), (entry.clone(), metadata.clone(), CacheStatus::Hit));

        let (e, _, status) = cache.get_blocking(&key("k1")).unwrap().unwrap();
        assert_eq!(e, entry);
        assert_eq!(status, CacheStatus::Hit);
    }

    #[tokio::test]
    async fn test_expired_entry_removed_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        let (entry, metadata) = sample();
        let expired = CacheMetadata {
            expires_at: Some(metadata.cached_at.saturating_sub(10)),
            ..metadata
        };

        cache.put(key("old"), entry, expired).await.unwrap();
        assert!(cache.is_expired(&key("old")).await.unwrap());

        let (_, _, status) = cache.get_blocking(&key("old")).unwrap().unwrap();
        assert_eq!(status, CacheStatus::Expired);
        assert!(!cache.contains(&key("old")).await.unwrap());
        assert!(cache.get(&key("old")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_metadata_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        let (entry, metadata) = sample();
        cache.put(key("bad"), entry, metadata).await.unwrap();
        std::fs::write(dir.path().join("bad.meta"), b"not json").unwrap();

        assert!(cache.get(&key("bad")).await.unwrap().is_none());
        assert!(!cache.contains(&key("bad")).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::open(dir.path()).unwrap();
        for name in ["a", "b"] {
            let (entry, metadata) = sample();
            let metadata = metadata.with_expiry(&Expiry::After(Duration::from_secs(60)));
            cache.put(key(name), entry, metadata).await.unwrap();
        }

        cache.remove(&key("a")).await.unwrap();
        assert!(!cache.contains(&key("a")).await.unwrap());
        cache.remove(&key("never-written")).await.unwrap();

        cache.clear().await.unwrap();
        assert!(!cache.contains(&key("b")).await.unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}

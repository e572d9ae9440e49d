use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{CacheEntry, ErrorCacheEntry};
use crate::error::{Error, Result};

use super::Cache;

/// Filesystem-backed cache: one JSON file per fingerprint, named by the
/// fingerprint's md5 hex digest, under `cache_dir`.
///
/// Grounded on `shadow_git/cache.rs`'s read/write pattern
/// (`read_to_string` → `serde_json::from_str`, `to_string_pretty` →
/// `write`), generalized with an md5-hashed single-key-per-fingerprint
/// layout and an atomic temp-file-then-rename write so a reader never
/// observes a half-written file.
pub struct FsCache {
    cache_dir: PathBuf,
}

impl FsCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(FsCache { cache_dir })
    }

    fn path_for(&self, fp: &str) -> PathBuf {
        let digest = md5::compute(fp.as_bytes());
        self.cache_dir.join(format!("{digest:x}"))
    }

    fn error_path_for(&self, fp: &str) -> PathBuf {
        let digest = md5::compute(format!("error:{fp}").as_bytes());
        self.cache_dir.join(format!("{digest:x}"))
    }

    fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Io(e)),
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                let _ = std::fs::remove_file(path);
                Err(Error::CacheNotValidJson)
            }
        }
    }

    fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "cache path has no parent directory",
            ))
        })?;
        let tmp = dir.join(format!(
            ".{}.tmp-{}",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("cache"),
            std::process::id()
        ));
        let body = serde_json::to_string(value)?;
        std::fs::write(&tmp, body)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[async_trait]
impl Cache for FsCache {
    async fn get(&self, fp: &str) -> Result<Option<CacheEntry>> {
        let path = self.path_for(fp);
        Self::read_json(&path)
    }

    async fn set(&self, fp: &str, entry: &CacheEntry, _ttl_seconds: u64) -> Result<()> {
        let path = self.path_for(fp);
        Self::write_json(&path, entry)
    }

    async fn delete(&self, fp: &str) -> Result<bool> {
        let path = self.path_for(fp);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn exists(&self, fp: &str) -> Result<bool> {
        Ok(self.path_for(fp).exists())
    }

    async fn get_error(&self, fp: &str) -> Result<Option<ErrorCacheEntry>> {
        let path = self.error_path_for(fp);
        Self::read_json(&path)
    }

    async fn set_error(&self, fp: &str, entry: &ErrorCacheEntry, _ttl_seconds: u64) -> Result<()> {
        let path = self.error_path_for(fp);
        Self::write_json(&path, entry)
    }

    async fn delete_error(&self, fp: &str) -> Result<bool> {
        let path = self.error_path_for(fp);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TargetGroup;

    fn entry() -> CacheEntry {
        CacheEntry {
            updated_timestamp: 100.0,
            results: vec![TargetGroup {
                targets: vec!["127.0.0.1:9100".to_string()],
                labels: Default::default(),
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_a_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        cache.set("/targets/x", &entry(), 300).await.unwrap();
        let got = cache.get("/targets/x").await.unwrap().unwrap();
        assert_eq!(got.results, entry().results);
    }

    #[tokio::test]
    async fn missing_entry_is_none_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        assert!(cache.get("/targets/nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_file_is_deleted_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        let path = cache.path_for("/targets/x");
        std::fs::write(&path, b"not json").unwrap();

        let err = cache.get("/targets/x").await.unwrap_err();
        assert!(matches!(err, Error::CacheNotValidJson));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn delete_reports_whether_something_was_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path()).unwrap();
        cache.set("/targets/x", &entry(), 300).await.unwrap();
        assert!(cache.delete("/targets/x").await.unwrap());
        assert!(!cache.delete("/targets/x").await.unwrap());
    }
}

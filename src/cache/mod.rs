mod fs;
mod redis_backed;

pub use fs::FsCache;
pub use redis_backed::RedisCache;

use crate::domain::{CacheEntry, ErrorCacheEntry};
use crate::error::Result;
use async_trait::async_trait;

/// Storage contract shared by the filesystem and Redis bindings. Freshness
/// (TTL comparison) is a caller concern — `get` returns whatever is stored,
/// expired or not, so the request handler can distinguish "never generated"
/// from "stale".
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, fp: &str) -> Result<Option<CacheEntry>>;
    async fn set(&self, fp: &str, entry: &CacheEntry, ttl_seconds: u64) -> Result<()>;
    async fn delete(&self, fp: &str) -> Result<bool>;
    async fn exists(&self, fp: &str) -> Result<bool>;

    /// Error-shadow cache, used by split-mode debug responses. The
    /// monolith binding (filesystem) implements this as a no-op store that
    /// always reports `None`, since the monolith has no separate worker
    /// process writing error shadows (see `dispatcher::Dispatcher`).
    async fn get_error(&self, fp: &str) -> Result<Option<ErrorCacheEntry>>;
    async fn set_error(&self, fp: &str, entry: &ErrorCacheEntry, ttl_seconds: u64) -> Result<()>;
    async fn delete_error(&self, fp: &str) -> Result<bool>;
}

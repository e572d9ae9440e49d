use async_trait::async_trait;
use redis::AsyncCommands;

use crate::domain::{CacheEntry, ErrorCacheEntry};
use crate::error::{Error, Result};

use super::Cache;

/// Error-shadow keys get a longer TTL than the success cache so a debug
/// request can still see why the last refresh failed well after the
/// success TTL would have expired it.
const ERROR_TTL_SECONDS: u64 = 3600;

/// Redis-backed cache, grounded on `redis/cache.py`'s `RedisCache`
/// (`get`/`set` via `setex`/`delete`/`exists`), with the error-shadow key
/// namespaced as `error:<fp>`.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(RedisCache { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    fn error_key(fp: &str) -> String {
        format!("error:{fp}")
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, fp: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(fp).await?;
        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entry) => Ok(Some(entry)),
                Err(_) => {
                    let _: () = conn.del(fp).await?;
                    Err(Error::CacheNotValidJson)
                }
            },
        }
    }

    async fn set(&self, fp: &str, entry: &CacheEntry, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(entry)?;
        let ttl = ttl_seconds.max(1);
        let _: () = conn.set_ex(fp, body, ttl).await?;
        Ok(())
    }

    async fn delete(&self, fp: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(fp).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, fp: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(fp).await?)
    }

    async fn get_error(&self, fp: &str) -> Result<Option<ErrorCacheEntry>> {
        let mut conn = self.conn().await?;
        let raw: Option<String> = conn.get(Self::error_key(fp)).await?;
        match raw {
            None => Ok(None),
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(entry) => Ok(Some(entry)),
                Err(_) => {
                    let _: () = conn.del(Self::error_key(fp)).await?;
                    Err(Error::CacheNotValidJson)
                }
            },
        }
    }

    async fn set_error(&self, fp: &str, entry: &ErrorCacheEntry, ttl_seconds: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(entry)?;
        let ttl = if ttl_seconds == 0 {
            ERROR_TTL_SECONDS
        } else {
            ttl_seconds
        };
        let _: () = conn.set_ex(Self::error_key(fp), body, ttl).await?;
        Ok(())
    }

    async fn delete_error(&self, fp: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(Self::error_key(fp)).await?;
        Ok(removed > 0)
    }
}

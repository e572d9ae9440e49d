use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::Cache;
use crate::domain::CacheEntry;
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::queue::JobQueue;

/// Debug-mode diagnostics, shaped differently for monolith vs split mode
/// (SPEC_FULL.md §6). `RequestHandler` serializes whichever variant its
/// bound `TargetDispatcher` returns.
#[derive(Debug, serde::Serialize)]
#[serde(untagged)]
pub enum DebugInfo {
    Monolith {
        generator_run_seconds: BTreeMap<String, f64>,
    },
    SplitErrorShadow(crate::domain::ErrorCacheEntry),
    SplitProcessing {
        status: &'static str,
    },
    SplitNoInfo {
        status: &'static str,
    },
}

/// Unifies the monolith `Dispatcher` and the split-mode
/// cache+queue combination behind one interface the HTTP handlers call,
/// so `handlers::targets` does not need to know which deployment mode is
/// active.
#[async_trait]
pub trait TargetDispatcher: Send + Sync {
    async fn get_targets(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<CacheEntry>;

    async fn debug_info(&self, path: &str, fp: &str, args: &BTreeMap<String, String>) -> DebugInfo;

    /// Split mode only: clears the cache + error-shadow for `fp` and
    /// enqueues a fresh job. Monolith mode has no queue to re-enqueue
    /// into, so it simply marks the task stale (next tick regenerates).
    async fn hard_reload(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<()>;
}

pub struct MonolithDispatcher {
    pub dispatcher: Arc<Dispatcher>,
}

#[async_trait]
impl TargetDispatcher for MonolithDispatcher {
    async fn get_targets(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<CacheEntry> {
        self.dispatcher.get_targets(path, fp, args).await
    }

    async fn debug_info(&self, path: &str, fp: &str, args: &BTreeMap<String, String>) -> DebugInfo {
        // The original monolith's `generate_perf` times each generator
        // file individually; here we approximate it with one entry for
        // the whole path's aggregate run, since the registry does not
        // expose per-file timings to callers outside `generator::run`.
        let start = Instant::now();
        let _ = self.dispatcher.get_targets(path, fp, args).await;
        let mut seconds = BTreeMap::new();
        seconds.insert(path.to_string(), start.elapsed().as_secs_f64());
        DebugInfo::Monolith {
            generator_run_seconds: seconds,
        }
    }

    async fn hard_reload(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.dispatcher.register(fp, path, args);
        Ok(())
    }
}

pub struct SplitDispatcher {
    pub cache: Arc<dyn Cache>,
    pub queue: Arc<dyn JobQueue>,
    pub cache_ttl_seconds: u64,
}

impl SplitDispatcher {
    async fn enqueue_if_absent(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.queue.contains(fp).await? {
            return Ok(());
        }
        let job =
            crate::domain::Job::new(fp.to_string(), path.to_string(), args.clone(), now_secs());
        self.queue.enqueue(job).await
    }
}

#[async_trait]
impl TargetDispatcher for SplitDispatcher {
    async fn get_targets(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<CacheEntry> {
        use crate::error::Error;

        match self.cache.get(fp).await? {
            None => {
                self.enqueue_if_absent(path, fp, args).await?;
                metrics::counter!(crate::metrics::CACHE_OPERATIONS_TOTAL, "status" => "miss")
                    .increment(1);
                Err(Error::CacheNotExist)
            }
            Some(entry) => {
                let age = now_secs() - entry.updated_timestamp;
                if age > self.cache_ttl_seconds as f64 {
                    self.enqueue_if_absent(path, fp, args).await?;
                    metrics::counter!(crate::metrics::CACHE_OPERATIONS_TOTAL, "status" => "expired")
                        .increment(1);
                    return Err(Error::CacheExpired {
                        updated_timestamp: entry.updated_timestamp,
                        cache_expire_seconds: self.cache_ttl_seconds,
                    });
                }
                metrics::counter!(crate::metrics::CACHE_OPERATIONS_TOTAL, "status" => "hit")
                    .increment(1);
                Ok(entry)
            }
        }
    }

    async fn debug_info(&self, path: &str, fp: &str, args: &BTreeMap<String, String>) -> DebugInfo {
        if let Ok(Some(shadow)) = self.cache.get_error(fp).await {
            return DebugInfo::SplitErrorShadow(shadow);
        }
        match self.queue.contains(fp).await {
            Ok(true) => DebugInfo::SplitProcessing {
                status: "processing",
            },
            _ => {
                let _ = self.enqueue_if_absent(path, fp, args).await;
                DebugInfo::SplitNoInfo {
                    status: "no_debug_info",
                }
            }
        }
    }

    async fn hard_reload(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.cache.delete(fp).await?;
        self.cache.delete_error(fp).await?;
        self.enqueue_if_absent(path, fp, args).await
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Shared application state handed to every axum handler.
pub struct AppState {
    pub dispatcher: Arc<dyn TargetDispatcher>,
    pub root_dir: std::path::PathBuf,
    pub generators: Arc<crate::generator::GeneratorRegistry>,
    pub url_prefix: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

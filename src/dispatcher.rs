use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::cache::Cache;
use crate::domain::{CacheEntry, Task, TargetGroupList};
use crate::error::{ClonedError, Error, Result};
use crate::generator::GeneratorRegistry;
use crate::single_flight::{self, SingleFlightCache, SingleFlightConfig};

/// How long a single refresh tick waits on a generator before giving up on
/// it (without cancelling it — see `SingleFlightCache`).
const GENERATOR_TIMEOUT: Duration = Duration::from_secs(30);
const SINGLE_FLIGHT_ERROR_TTL: Duration = Duration::from_secs(10);
const SINGLE_FLIGHT_GC_INTERVAL: Duration = Duration::from_secs(60);
const SINGLE_FLIGHT_GC_THRESHOLD: usize = 64;

/// Monolith-mode refresh engine: one `Task` per distinct fingerprint,
/// refreshed on a fixed interval by a bounded worker pool.
///
/// Grounded on `dispather.py`'s `Dispatcher`/`Task`/`run_forever`, with
/// the original's unbounded `ThreadPoolExecutor(max_workers)` submit loop
/// replaced by a `tokio::sync::Semaphore` so a slow generator can never
/// push concurrency past `max_workers`. Generator execution itself runs
/// through a `SingleFlightCache` keyed by fp, so a fp whose previous
/// refresh is still running is never dispatched twice concurrently.
pub struct Dispatcher {
    tasks: DashMap<String, Task>,
    cache: Arc<dyn Cache>,
    generators: Arc<GeneratorRegistry>,
    single_flight: Arc<SingleFlightCache<String, TargetGroupList>>,
    permits: Arc<Semaphore>,
    interval: Duration,
    cache_ttl_seconds: u64,
    stop: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(
        cache: Arc<dyn Cache>,
        generators: Arc<GeneratorRegistry>,
        interval: Duration,
        max_workers: usize,
        cache_ttl_seconds: u64,
    ) -> Self {
        let single_flight = single_flight::new_shared(SingleFlightConfig {
            success_ttl: Duration::from_secs(cache_ttl_seconds),
            error_ttl: SINGLE_FLIGHT_ERROR_TTL,
            gc_interval: SINGLE_FLIGHT_GC_INTERVAL,
            gc_threshold: SINGLE_FLIGHT_GC_THRESHOLD,
        });
        Dispatcher {
            tasks: DashMap::new(),
            cache,
            generators,
            single_flight,
            permits: Arc::new(Semaphore::new(max_workers)),
            interval,
            cache_ttl_seconds,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers (or re-marks) the task backing `fp` as needing a refresh.
    /// Always cheap and non-blocking: never runs the generator itself.
    pub fn register(&self, fp: &str, path: &str, args: &BTreeMap<String, String>) {
        self.tasks
            .entry(fp.to_string())
            .and_modify(|t| t.need_update = true)
            .or_insert_with(|| Task::new(fp.to_string(), path.to_string(), args.clone()));
    }

    pub async fn get_targets(
        &self,
        path: &str,
        fp: &str,
        args: &BTreeMap<String, String>,
    ) -> Result<CacheEntry> {
        self.register(fp, path, args);

        let entry = self.cache.get(fp).await?.ok_or(Error::CacheNotExist)?;
        let age = now_secs() - entry.updated_timestamp;
        if age > self.cache_ttl_seconds as f64 {
            return Err(Error::CacheExpired {
                updated_timestamp: entry.updated_timestamp,
                cache_expire_seconds: self.cache_ttl_seconds,
            });
        }
        Ok(entry)
    }

    /// Spawns the self-healing refresh loop. The returned handle is
    /// intentionally discarded by callers that only need the supervisor
    /// (see `spawn_supervised`); exposed separately for tests that want to
    /// drive a single tick deterministically.
    pub async fn tick(self: &Arc<Self>) {
        let stale: Vec<Task> = self
            .tasks
            .iter()
            .filter(|t| t.need_update && !t.running)
            .map(|t| t.clone())
            .collect();

        for task in stale {
            if let Some(mut entry) = self.tasks.get_mut(&task.fp) {
                entry.need_update = false;
                entry.running = true;
            }
            let this = self.clone();
            let fp = task.fp.clone();
            let permits = self.permits.clone();
            tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return,
                };
                this.refresh(task).await;
                if let Some(mut entry) = this.tasks.get_mut(&fp) {
                    entry.running = false;
                }
            });
        }
    }

    async fn refresh(&self, task: Task) {
        let generators = self.generators.clone();
        let path = task.path.clone();
        let args = task.args.clone();

        let result = self
            .single_flight
            .call(task.fp.clone(), GENERATOR_TIMEOUT, move || async move {
                generators
                    .run(&path, &args)
                    .await
                    .map_err(|e| ClonedError::from(&e))
            })
            .await;

        match result {
            Ok(results) => {
                let entry = CacheEntry {
                    updated_timestamp: now_secs(),
                    results: (*results).clone(),
                };
                if let Err(e) = self.cache.set(&task.fp, &entry, self.cache_ttl_seconds).await {
                    error!(fp = %task.fp, error = %e, "failed to write refreshed cache entry");
                }
            }
            Err(cloned) => {
                let e: Error = cloned.into();
                warn!(fp = %task.fp, error = %e, "generator refresh failed, keeping stale cache entry");
            }
        }
    }

    /// Runs the refresh loop forever, restarting itself if a tick panics.
    /// Mirrors `run_forever`'s `while True: ... sleep(interval)` shape,
    /// generalized with a supervising outer loop since `tokio::spawn`
    /// tasks, unlike Python threads, can be individually panic-isolated
    /// and detected via `JoinHandle`.
    pub fn spawn_supervised(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                if self.stop.load(Ordering::Relaxed) {
                    return;
                }
                let this = self.clone();
                let handle = tokio::spawn(async move {
                    loop {
                        if this.stop.load(Ordering::Relaxed) {
                            return;
                        }
                        this.tick().await;
                        tokio::time::sleep(this.interval).await;
                    }
                });
                match handle.await {
                    Ok(()) => return,
                    Err(e) => {
                        error!(error = %e, "refresh loop task died, restarting");
                    }
                }
            }
        });
    }

    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FsCache;
    use crate::domain::TargetGroup;

    async fn make_dispatcher(root: &std::path::Path, cache_dir: &std::path::Path) -> Arc<Dispatcher> {
        let gen_path = root.join("a.json");
        std::fs::write(
            &gen_path,
            br#"[{"targets":["h:1"],"labels":{}}]"#,
        )
        .unwrap();
        let cache: Arc<dyn Cache> = Arc::new(FsCache::new(cache_dir).unwrap());
        let generators = Arc::new(GeneratorRegistry::new(root));
        Arc::new(Dispatcher::new(
            cache,
            generators,
            Duration::from_millis(10),
            2,
            300,
        ))
    }

    #[tokio::test]
    async fn first_request_schedules_refresh_without_blocking() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let dispatcher = make_dispatcher(root.path(), cache_dir.path()).await;

        let err = dispatcher
            .get_targets("", "/targets", &BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CacheNotExist));
        assert_eq!(dispatcher.task_count(), 1);
    }

    #[tokio::test]
    async fn tick_populates_the_cache() {
        let root = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        let dispatcher = make_dispatcher(root.path(), cache_dir.path()).await;

        dispatcher
            .get_targets("", "/targets", &BTreeMap::new())
            .await
            .unwrap_err();
        dispatcher.tick().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        let entry = dispatcher
            .get_targets("", "/targets", &BTreeMap::new())
            .await
            .unwrap();
        assert_eq!(
            entry.results,
            vec![TargetGroup {
                targets: vec!["h:1".to_string()],
                labels: Default::default(),
            }]
        );
    }
}

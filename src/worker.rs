use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cache::Cache;
use crate::domain::{CacheEntry, ErrorCacheEntry, ErrorDetails, Job};
use crate::error::Error;
use crate::generator::GeneratorRegistry;
use crate::queue::JobQueue;

/// Split-mode background worker: dequeues `Job`s and writes the shared
/// cache, independent of any server process.
///
/// Grounded on `redis/worker.py`'s `Worker._process_job`/`WorkerPool`:
/// same error-shadow cache write on failure, same per-worker job counter,
/// same graceful-drain-on-signal shutdown.
pub struct WorkerPool {
    worker_count: usize,
    queue: Arc<dyn JobQueue>,
    cache: Arc<dyn Cache>,
    generators: Arc<GeneratorRegistry>,
    cache_ttl_seconds: u64,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        queue: Arc<dyn JobQueue>,
        cache: Arc<dyn Cache>,
        generators: Arc<GeneratorRegistry>,
        cache_ttl_seconds: u64,
    ) -> Self {
        WorkerPool {
            worker_count,
            queue,
            cache,
            generators,
            cache_ttl_seconds,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawns `worker_count` long-lived workers and a signal-watcher task
    /// that flips the shared stop flag on SIGINT/SIGTERM, then blocks
    /// until every worker has drained its current job and exited.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let mut handles = Vec::new();
        for id in 0..self.worker_count {
            let this = self.clone();
            handles.push(tokio::spawn(async move { this.worker_loop(id).await }));
        }

        self.wait_for_shutdown_signal().await;
        self.stop.store(true, Ordering::Relaxed);
        tracing::info!("shutdown signal received, draining workers");

        for h in handles {
            let _ = h.await;
        }
        Ok(())
    }

    async fn wait_for_shutdown_signal(&self) {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
            let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
            tokio::select! {
                _ = sigint.recv() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
    }

    async fn worker_loop(&self, id: usize) {
        let worker_id = format!("worker-{id}");
        while !self.stop.load(Ordering::Relaxed) {
            let job = match self.queue.dequeue(Duration::from_secs(1)).await {
                Ok(Some(job)) => job,
                Ok(None) => continue,
                Err(e) => {
                    tracing::error!(worker = %worker_id, error = %e, "dequeue failed");
                    continue;
                }
            };
            self.process_job(&worker_id, job).await;
        }
    }

    async fn process_job(&self, worker_id: &str, job: Job) {
        let start = Instant::now();
        let result = self.generators.run(&job.path, &job.args).await;
        let elapsed = start.elapsed().as_secs_f64();

        metrics::histogram!(
            crate::metrics::GENERATOR_RUN_DURATION_SECONDS,
            "path" => job.path.clone()
        )
        .record(elapsed);

        match result {
            Ok(results) => {
                let entry = CacheEntry {
                    updated_timestamp: now_secs(),
                    results,
                };
                if let Err(e) = self
                    .cache
                    .set(&job.fp, &entry, self.cache_ttl_seconds)
                    .await
                {
                    tracing::error!(fp = %job.fp, error = %e, "failed to write cache entry");
                }
                metrics::counter!(
                    crate::metrics::WORKER_JOBS_PROCESSED_TOTAL,
                    "status" => "success"
                )
                .increment(1);
            }
            Err(e) => {
                let details = error_details(worker_id, &job, &e, elapsed);
                let shadow = ErrorCacheEntry {
                    updated_timestamp: now_secs(),
                    status: "error".to_string(),
                    error_details: details,
                };
                if let Err(write_err) = self.cache.set_error(&job.fp, &shadow, 3600).await {
                    tracing::error!(fp = %job.fp, error = %write_err, "failed to write error-shadow cache entry");
                }
                metrics::counter!(
                    crate::metrics::WORKER_JOBS_PROCESSED_TOTAL,
                    "status" => "error"
                )
                .increment(1);
            }
        }

        if let Err(e) = self.queue.complete(&job).await {
            tracing::warn!(fp = %job.fp, error = %e, "failed to mark job complete");
        }
    }
}

fn error_details(worker_id: &str, job: &Job, err: &Error, elapsed: f64) -> ErrorDetails {
    ErrorDetails {
        error_type: format!("{err:?}").split('(').next().unwrap_or("Error").to_string(),
        message: err.to_string(),
        traceback: format!("{err:#?}"),
        worker_id: worker_id.to_string(),
        job_id: job.job_id.clone(),
        path: job.path.clone(),
        args: job.args.clone(),
        timestamp: Utc::now().to_rfc3339(),
        processing_time: elapsed,
    }
}

fn now_secs() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

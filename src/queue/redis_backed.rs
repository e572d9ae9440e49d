use async_trait::async_trait;
use redis::AsyncCommands;
use std::time::Duration;

use crate::domain::Job;
use crate::error::Result;

use super::JobQueue;

const QUEUE_NAME: &str = "httpsd:target_generation_queue";
const PROCESSING_NAME: &str = "httpsd:target_generation_queue:processing";

/// Redis-list-backed FIFO, grounded on `redis/queue.py`'s
/// `RedisJobQueue`: `LPUSH`/`BRPOP` for the main queue, with dequeued jobs
/// mirrored onto a processing list purely for visibility (`contains` scans
/// both lists; nothing reclaims a job whose worker crashed mid-processing,
/// matching the original's documented limitation).
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(RedisJobQueue { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn scan_contains(
        conn: &mut redis::aio::MultiplexedConnection,
        list: &str,
        fp: &str,
    ) -> Result<bool> {
        let raw: Vec<String> = conn.lrange(list, 0, -1).await?;
        for item in raw {
            if let Ok(job) = serde_json::from_str::<Job>(&item) {
                if job.fp == fp {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(&job)?;
        let _: () = conn.lpush(QUEUE_NAME, body).await?;
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>> {
        let mut conn = self.conn().await?;
        let secs = timeout.as_secs_f64().max(0.0);
        let popped: Option<(String, String)> = conn.brpop(QUEUE_NAME, secs).await?;
        let Some((_, raw)) = popped else {
            return Ok(None);
        };
        let job: Job = serde_json::from_str(&raw)?;
        // Mirror into the processing list for visibility; best-effort —
        // a crash between brpop and here loses the job, which is an
        // accepted, documented race (SPEC_FULL.md §7).
        let _: () = conn.lpush(PROCESSING_NAME, raw).await?;
        Ok(Some(job))
    }

    async fn contains(&self, fp: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        if Self::scan_contains(&mut conn, QUEUE_NAME, fp).await? {
            return Ok(true);
        }
        Self::scan_contains(&mut conn, PROCESSING_NAME, fp).await
    }

    async fn length(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(QUEUE_NAME).await?)
    }

    async fn processing_length(&self) -> Result<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(PROCESSING_NAME).await?)
    }

    async fn complete(&self, job: &Job) -> Result<()> {
        let mut conn = self.conn().await?;
        let body = serde_json::to_string(job)?;
        let _: () = conn.lrem(PROCESSING_NAME, 1, body).await?;
        Ok(())
    }
}

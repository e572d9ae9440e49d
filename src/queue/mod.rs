mod redis_backed;

pub use redis_backed::RedisJobQueue;

use crate::domain::Job;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// FIFO of pending refresh jobs, used only in split deployment mode.
///
/// `contains` is an approximation, not a linearizable check — see
/// SPEC_FULL.md §7 on the known enqueue/contains race. Implementations
/// MUST still guarantee at-most-one-in-flight is the *common* case, not
/// an invariant enforced by locking across processes.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: Job) -> Result<()>;
    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>>;
    async fn contains(&self, fp: &str) -> Result<bool>;
    async fn length(&self) -> Result<u64>;
    async fn processing_length(&self) -> Result<u64>;
    /// Removes `job` from the processing sub-queue once a worker finishes
    /// it. No-op if the job is no longer present (already reclaimed, or
    /// never made it there).
    async fn complete(&self, job: &Job) -> Result<()>;
}

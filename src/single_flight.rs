//! Per-key single-flight deduplication with independent success/error TTLs
//! and non-cancelling timeouts.
//!
//! Grounded on `decorator.py`'s `TimeoutDecorator`: a thread-per-key cache
//! with a companion expiry heap and three disjoint locks. Here the thread
//! is a `tokio` task and the "join with timeout, but let the thread keep
//! running" behavior is expressed with `futures::future::Shared` — a
//! waiter can stop polling the shared future without affecting the task
//! driving it to completion.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::ClonedError;

type SharedOutcome<V> = Shared<BoxFuture<'static, Result<Arc<V>, ClonedError>>>;

struct Slot<V> {
    future: SharedOutcome<V>,
    /// Set once the future resolves; `None` while still in flight.
    expires_at: Option<Instant>,
}

struct HeapEntry {
    expires_at: Instant,
    generation: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.expires_at == other.expires_at
    }
}
impl Eq for HeapEntry {}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the earliest expiry first.
        other.expires_at.cmp(&self.expires_at)
    }
}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Tracks, per heap entry, which key it refers to and which "generation"
/// of that key's slot it was issued for — a key can be re-populated after
/// expiry, and a stale heap entry from a previous generation must not evict
/// the new one.
struct GcBookkeeping<K> {
    heap: BinaryHeap<HeapEntry>,
    by_generation: HashMap<u64, K>,
    next_generation: u64,
}

pub struct SingleFlightCache<K, V> {
    entries: Mutex<HashMap<K, (Slot<V>, u64)>>,
    gc: Mutex<GcBookkeeping<K>>,
    last_gc: Mutex<Instant>,
    gc_interval: Duration,
    gc_threshold: usize,
    success_ttl: Duration,
    error_ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct SingleFlightConfig {
    pub success_ttl: Duration,
    pub error_ttl: Duration,
    pub gc_interval: Duration,
    pub gc_threshold: usize,
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(config: SingleFlightConfig) -> Self {
        SingleFlightCache {
            entries: Mutex::new(HashMap::new()),
            gc: Mutex::new(GcBookkeeping {
                heap: BinaryHeap::new(),
                by_generation: HashMap::new(),
                next_generation: 0,
            }),
            last_gc: Mutex::new(Instant::now()),
            gc_interval: config.gc_interval,
            gc_threshold: config.gc_threshold,
            success_ttl: config.success_ttl,
            error_ttl: config.error_ttl,
        }
    }

    /// Runs `f` for `key`, deduplicating concurrent callers. `timeout`
    /// bounds how long THIS caller waits; it never cancels the underlying
    /// execution, which keeps running (and, on completion, populates the
    /// cache) independent of whether anyone is still waiting on it.
    ///
    /// Takes `self: &Arc<Self>` because the completion bookkeeping must
    /// outlive this particular call — it is driven by a detached task that
    /// holds its own clone of the `Arc`.
    pub async fn call<F, Fut>(
        self: &Arc<Self>,
        key: K,
        timeout: Duration,
        f: F,
    ) -> Result<Arc<V>, ClonedError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<V, ClonedError>> + Send + 'static,
    {
        let future = self.get_or_spawn(key, f);

        let result = match tokio::time::timeout(timeout, future).await {
            Ok(outcome) => outcome,
            Err(_) => {
                return Err(ClonedError {
                    label: "timeout",
                    message: "timed out waiting for generation".to_string(),
                });
            }
        };

        self.maybe_gc();
        result
    }

    fn get_or_spawn<F, Fut>(self: &Arc<Self>, key: K, f: F) -> SharedOutcome<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<V, ClonedError>> + Send + 'static,
    {
        let mut entries = self.entries.lock();

        if let Some((slot, _generation)) = entries.get(&key) {
            let alive = match slot.expires_at {
                None => true, // still in flight
                Some(exp) => exp > Instant::now(),
            };
            if alive {
                return slot.future.clone();
            }
        }

        let generation = self.next_generation();
        let success_ttl = self.success_ttl;
        let error_ttl = self.error_ttl;
        let completion_key = key.clone();

        let shared: SharedOutcome<V> = async move {
            let outcome = f().await;
            outcome.map(Arc::new)
        }
        .boxed()
        .shared();

        entries.insert(
            key.clone(),
            (
                Slot {
                    future: shared.clone(),
                    expires_at: None,
                },
                generation,
            ),
        );
        drop(entries);

        // Drive completion bookkeeping independent of any particular
        // waiter: this task always runs to completion, even if the
        // caller that spawned it times out.
        let watcher = shared.clone();
        let this = self.clone();
        tokio::spawn(async move {
            let outcome = watcher.await;
            let ttl = if outcome.is_ok() { success_ttl } else { error_ttl };
            let expires_at = Instant::now() + ttl;

            {
                let mut entries = this.entries.lock();
                if let Some((slot, gen_now)) = entries.get_mut(&completion_key) {
                    if *gen_now == generation {
                        slot.expires_at = Some(expires_at);
                    }
                }
            }
            {
                let mut gc = this.gc.lock();
                gc.heap.push(HeapEntry {
                    expires_at,
                    generation,
                });
                gc.by_generation.insert(generation, completion_key);
            }
        });

        shared
    }

    fn next_generation(&self) -> u64 {
        let mut gc = self.gc.lock();
        let g = gc.next_generation;
        gc.next_generation += 1;
        g
    }

    fn can_gc(&self) -> bool {
        let mut last = self.last_gc.lock();
        let gc = self.gc.lock();
        let due = last.elapsed() >= self.gc_interval && gc.heap.len() > self.gc_threshold;
        if due {
            *last = Instant::now();
        }
        due
    }

    fn maybe_gc(&self) {
        if self.can_gc() {
            self.reap();
        }
    }

    /// Evicts expired entries. Safe to call directly (tests do this with
    /// automatic GC effectively disabled via a very large `gc_interval`).
    pub fn reap(&self) {
        let now = Instant::now();
        let mut to_check: Vec<(u64, K)> = Vec::new();
        {
            let mut gc = self.gc.lock();
            while let Some(top) = gc.heap.peek() {
                if top.expires_at > now {
                    break;
                }
                let entry = gc.heap.pop().unwrap();
                if let Some(key) = gc.by_generation.remove(&entry.generation) {
                    to_check.push((entry.generation, key));
                }
            }
        }

        let mut entries = self.entries.lock();
        for (generation, key) in to_check {
            if let Some((slot, gen_now)) = entries.get(&key) {
                if *gen_now == generation {
                    let expired = slot.expires_at.map(|e| e <= now).unwrap_or(false);
                    if expired {
                        entries.remove(&key);
                        metrics::counter!(crate::metrics::SINGLE_FLIGHT_REAPED_TOTAL).increment(1);
                    }
                }
            }
        }
        metrics::gauge!(crate::metrics::SINGLE_FLIGHT_ENTRIES).set(entries.len() as f64);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Constructs a `SingleFlightCache` behind an `Arc`. This is the only
/// supported construction path: the completion task spawned by `call`
/// needs the cache to outlive the call itself, which an `Arc` guarantees
/// and a bare `&self` does not.
pub fn new_shared<K, V>(config: SingleFlightConfig) -> Arc<SingleFlightCache<K, V>>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    Arc::new(SingleFlightCache::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn cfg() -> SingleFlightConfig {
        SingleFlightConfig {
            success_ttl: Duration::from_millis(50),
            error_ttl: Duration::from_millis(50),
            gc_interval: Duration::from_secs(3600),
            gc_threshold: 0,
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_execution() {
        let cache: Arc<SingleFlightCache<String, u32>> = new_shared(cfg());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .call("k".to_string(), Duration::from_secs(1), move || {
                        let calls = calls.clone();
                        async move {
                            calls.fetch_add(1, AtomicOrdering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok::<_, ClonedError>(42u32)
                        }
                    })
                    .await
            }));
        }

        for h in handles {
            let v = h.await.unwrap().unwrap();
            assert_eq!(*v, 42);
        }
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_entry_triggers_new_execution() {
        let cache: Arc<SingleFlightCache<String, u32>> = new_shared(cfg());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls2 = calls.clone();
            let v = cache
                .call("k".to_string(), Duration::from_secs(1), move || {
                    let calls2 = calls2.clone();
                    async move {
                        calls2.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok::<_, ClonedError>(7u32)
                    }
                })
                .await
                .unwrap();
            assert_eq!(*v, 7);
            tokio::time::sleep(Duration::from_millis(80)).await;
        }
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn timeout_does_not_cancel_background_execution() {
        let cache: Arc<SingleFlightCache<String, u32>> = new_shared(cfg());
        let done = Arc::new(AtomicUsize::new(0));

        let done2 = done.clone();
        let first = cache.call("k".to_string(), Duration::from_millis(5), move || {
            let done2 = done2.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(60)).await;
                done2.fetch_add(1, AtomicOrdering::SeqCst);
                Ok::<_, ClonedError>(1u32)
            }
        });
        let res = first.await;
        assert!(res.is_err());

        // Give the background task time to finish even though the first
        // caller already gave up.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(done.load(AtomicOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_independent_copies() {
        let cache: Arc<SingleFlightCache<String, u32>> = new_shared(SingleFlightConfig {
            error_ttl: Duration::from_millis(0),
            ..cfg()
        });

        let e1 = cache
            .call("k".to_string(), Duration::from_secs(1), || async {
                Err(ClonedError {
                    label: "fail",
                    message: "boom".to_string(),
                })
            })
            .await
            .unwrap_err();

        tokio::time::sleep(Duration::from_millis(10)).await;

        let e2 = cache
            .call("k".to_string(), Duration::from_secs(1), || async {
                Err(ClonedError {
                    label: "fail",
                    message: "boom again".to_string(),
                })
            })
            .await
            .unwrap_err();

        assert_eq!(e1.message, "boom");
        assert_eq!(e2.message, "boom again");
    }

    #[tokio::test]
    async fn reap_only_evicts_expired_entries() {
        let cache: Arc<SingleFlightCache<String, u32>> = new_shared(cfg());

        cache
            .call("alive".to_string(), Duration::from_secs(1), || async {
                Ok::<_, ClonedError>(1u32)
            })
            .await
            .unwrap();
        cache
            .call("dying".to_string(), Duration::from_secs(1), || async {
                Ok::<_, ClonedError>(2u32)
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.reap();
        // Both TTLs are identical and both have now expired.
        assert_eq!(cache.len(), 0);
    }
}

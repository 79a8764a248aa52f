//! Bounded-concurrency execution queues
//!
//! Each queue admits at most `capacity` operations at a time. Queues are
//! independent: a saturated write queue never delays a fetch queue.
//!
//! Admission is first-come-first-served. `tokio::sync::Semaphore` is fair, so
//! operations are admitted in the order their futures first wait for a slot.
//! Completion order is not guaranteed.

use smithers_common::config::SchedulerConfig;
use smithers_common::db::AdapterKind;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Name of the shared storage write queue
pub const WRITE_QUEUE: &str = "write";

/// Name of the fetch queue for an adapter kind
pub fn fetch_queue_name(kind: &AdapterKind) -> String {
    format!("fetch:{}", kind)
}

struct QueueInner {
    name: String,
    capacity: usize,
    permits: Semaphore,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

/// Named queue limiting how many submitted operations run at once
///
/// Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<QueueInner>,
}

/// Decrements the in-flight counter however the operation ends
struct InFlightGuard<'a> {
    counter: &'a AtomicUsize,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ExecutionQueue {
    /// Create a queue; a capacity of 0 is raised to 1
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                capacity,
                permits: Semaphore::new(capacity),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Operations currently admitted and executing
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Highest in-flight count observed since the queue was created
    pub fn peak_in_flight(&self) -> usize {
        self.inner.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Submit an operation
    ///
    /// The returned future is the completion handle: it waits for a free
    /// slot, runs `op` while holding it, and resolves to `op`'s output.
    pub fn schedule<F>(&self, op: F) -> impl Future<Output = F::Output> + Send
    where
        F: Future + Send,
        F::Output: Send,
    {
        let inner = Arc::clone(&self.inner);
        async move {
            let _permit = inner
                .permits
                .acquire()
                .await
                .expect("execution queue semaphore is never closed");

            let now_running = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.peak_in_flight.fetch_max(now_running, Ordering::SeqCst);
            let _guard = InFlightGuard {
                counter: &inner.in_flight,
            };

            tracing::trace!(queue = %inner.name, in_flight = now_running, "Operation admitted");

            op.await
        }
    }
}

impl std::fmt::Debug for ExecutionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionQueue")
            .field("name", &self.inner.name)
            .field("capacity", &self.inner.capacity)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Set of queues used by one run: one fetch queue per adapter kind and one
/// shared write queue
#[derive(Debug, Clone)]
pub struct Scheduler {
    write: ExecutionQueue,
    fetch: HashMap<AdapterKind, ExecutionQueue>,
}

impl Scheduler {
    /// Build queues for every supported adapter kind from run configuration
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let mut scheduler = Self::with_write_capacity(config.write_concurrency);
        for kind in AdapterKind::supported() {
            scheduler.add_fetch_queue(kind, config.fetch_concurrency);
        }
        scheduler
    }

    /// Scheduler with only a write queue
    pub fn with_write_capacity(capacity: usize) -> Self {
        Self {
            write: ExecutionQueue::new(WRITE_QUEUE, capacity),
            fetch: HashMap::new(),
        }
    }

    /// Add (or replace) the fetch queue for an adapter kind
    pub fn add_fetch_queue(&mut self, kind: AdapterKind, capacity: usize) -> ExecutionQueue {
        let queue = ExecutionQueue::new(fetch_queue_name(&kind), capacity);
        self.fetch.insert(kind, queue.clone());
        queue
    }

    pub fn write_queue(&self) -> &ExecutionQueue {
        &self.write
    }

    pub fn fetch_queue(&self, kind: &AdapterKind) -> Option<&ExecutionQueue> {
        self.fetch.get(kind)
    }

    /// Look a queue up by name
    pub fn queue(&self, name: &str) -> Option<&ExecutionQueue> {
        if name == self.write.name() {
            return Some(&self.write);
        }
        self.fetch.values().find(|q| q.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_never_exceeds_capacity() {
        let queue = ExecutionQueue::new("write", 50);
        let observed_max = Arc::new(AtomicUsize::new(0));

        let ops = (0..200).map(|i| {
            let queue_probe = queue.clone();
            let observed_max = Arc::clone(&observed_max);
            queue.schedule(async move {
                observed_max.fetch_max(queue_probe.in_flight(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1 + (i % 5) as u64)).await;
                observed_max.fetch_max(queue_probe.in_flight(), Ordering::SeqCst);
                i
            })
        });

        let results = join_all(ops).await;

        assert_eq!(results.len(), 200);
        assert!(observed_max.load(Ordering::SeqCst) <= 50);
        assert!(queue.peak_in_flight() <= 50);
        assert_eq!(queue.peak_in_flight(), 50, "queue should saturate");
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_capacity_one_serializes() {
        let queue = ExecutionQueue::new("fetch:webtoon", 1);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        let ops = (0..5).map(|i| {
            let order = Arc::clone(&order);
            queue.schedule(async move {
                order.lock().unwrap().push(format!("start {}", i));
                tokio::time::sleep(Duration::from_millis(2)).await;
                order.lock().unwrap().push(format!("end {}", i));
            })
        });
        join_all(ops).await;

        let order = order.lock().unwrap().clone();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {}", i), format!("end {}", i)])
            .collect();
        assert_eq!(order, expected, "admission must follow submission order");
        assert_eq!(queue.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_queues_are_independent() {
        let scheduler = Scheduler::from_config(&SchedulerConfig {
            write_concurrency: 1,
            fetch_concurrency: 1,
        });
        let write = scheduler.write_queue().clone();
        let fetch = scheduler.fetch_queue(&AdapterKind::Mangadex).unwrap().clone();

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        // Occupy the only write slot until released
        let blocked_write = write.schedule(async move {
            let _ = release_rx.await;
        });

        let fetch_then_release = async {
            let value = fetch.schedule(async { 7 }).await;
            let _ = release_tx.send(());
            value
        };

        let ((), value) = tokio::join!(blocked_write, fetch_then_release);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        assert_eq!(ExecutionQueue::new("q", 0).capacity(), 1);
    }

    #[test]
    fn test_queue_lookup_by_name() {
        let scheduler = Scheduler::from_config(&SchedulerConfig::default());

        assert_eq!(scheduler.queue(WRITE_QUEUE).unwrap().capacity(), 50);
        assert_eq!(scheduler.queue("fetch:webtoon").unwrap().capacity(), 1);
        assert_eq!(scheduler.queue("fetch:mangadex").unwrap().capacity(), 1);
        assert!(scheduler.queue("fetch:tapas").is_none());
    }
}

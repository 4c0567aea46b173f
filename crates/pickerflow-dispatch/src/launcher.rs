//! Bounded-concurrency launcher for per-item operations.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::CONCURRENCY_LIMIT;

/// Launch counters, shared with whoever wants to watch a run.
#[derive(Debug, Default)]
pub struct LaunchStats {
    started: AtomicUsize,
    completed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    skipped: AtomicUsize,
}

impl LaunchStats {
    /// Operations handed to the handler so far.
    pub fn started(&self) -> usize {
        self.started.load(Ordering::Acquire)
    }

    /// Operations whose handler future finished.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    /// Highest number of operations running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    /// Operations dropped from the queue without being launched.
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::Acquire)
    }

    fn skip(&self, count: usize) {
        self.skipped.fetch_add(count, Ordering::AcqRel);
    }

    fn launch(&self) {
        self.started.fetch_add(1, Ordering::AcqRel);
        let running = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::AcqRel);
    }

    fn finish(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.completed.fetch_add(1, Ordering::AcqRel);
    }
}

/// FIFO queue of operations released with at most `limit` running at once.
///
/// Each finished operation returns its permit, which is what wakes the
/// launcher to release the next one. [`ThrottledLauncher::run`] returns once
/// the queue is empty and every launched operation has finished.
#[derive(Debug)]
pub struct ThrottledLauncher<T> {
    queue: VecDeque<T>,
    stats: Arc<LaunchStats>,
}

impl<T> Default for ThrottledLauncher<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            stats: Arc::new(LaunchStats::default()),
        }
    }
}

impl<T: Send + 'static> ThrottledLauncher<T> {
    /// Create an empty launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an operation to the queue.
    pub fn enqueue(&mut self, op: T) {
        self.queue.push_back(op);
    }

    /// Number of operations waiting to launch.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if nothing is waiting to launch.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Counters for this launcher.
    pub fn stats(&self) -> Arc<LaunchStats> {
        Arc::clone(&self.stats)
    }

    /// Launch every queued operation through `handler`.
    ///
    /// `handler` is called exactly once per operation, in queue order, and
    /// its future runs on its own task. A `limit` of zero is treated as one.
    pub async fn run<F, Fut>(self, limit: usize, handler: F) -> Arc<LaunchStats>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.run_while(limit, || true, handler).await
    }

    /// Like [`ThrottledLauncher::run`], but stops launching once
    /// `keep_going` returns false.
    ///
    /// `keep_going` is checked each time a slot frees up, right before the
    /// next operation would start. Operations already running still finish;
    /// the ones left in the queue are counted as skipped and never handed
    /// to `handler`.
    pub async fn run_while<K, F, Fut>(mut self, limit: usize, keep_going: K, handler: F) -> Arc<LaunchStats>
    where
        K: Fn() -> bool,
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let limit = limit.max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let tracker = TaskTracker::new();
        debug!(queued = self.queue.len(), limit, "Launcher started");

        while !self.queue.is_empty() {
            // The semaphore is never closed, so this only waits for a slot.
            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                break;
            };
            if !keep_going() {
                self.stats.skip(self.queue.len());
                debug!(skipped = self.queue.len(), "Launcher stopped");
                self.queue.clear();
                break;
            }
            let Some(op) = self.queue.pop_front() else {
                break;
            };

            self.stats.launch();
            let stats = Arc::clone(&self.stats);
            let operation = handler(op);
            tracker.spawn(async move {
                operation.await;
                stats.finish();
                drop(permit);
            });
        }

        tracker.close();
        tracker.wait().await;
        debug!(
            started = self.stats.started(),
            peak = self.stats.peak_in_flight(),
            "Launcher drained"
        );
        self.stats
    }

    /// Launch with the default concurrency ceiling of 4.
    pub async fn run_default<F, Fut>(self, handler: F) -> Arc<LaunchStats>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.run(CONCURRENCY_LIMIT, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_launches_in_queue_order() {
        let mut launcher = ThrottledLauncher::new();
        for i in 0..6 {
            launcher.enqueue(i);
        }
        assert_eq!(launcher.len(), 6);

        let order = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&order);
        launcher
            .run(1, move |i| {
                seen.lock().unwrap().push(i);
                async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await;

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_operation_runs_once_under_ceiling() {
        let mut launcher = ThrottledLauncher::new();
        for i in 0..10 {
            launcher.enqueue(i);
        }

        let runs = Arc::new(Mutex::new(vec![0; 10]));
        let counted = Arc::clone(&runs);
        let stats = launcher
            .run_default(move |i: usize| {
                let counted = Arc::clone(&counted);
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    counted.lock().unwrap()[i] += 1;
                }
            })
            .await;

        assert_eq!(*runs.lock().unwrap(), vec![1; 10]);
        assert_eq!(stats.started(), 10);
        assert_eq!(stats.completed(), 10);
        assert_eq!(stats.peak_in_flight(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_leaves_queue_unlaunched() {
        let mut launcher = ThrottledLauncher::new();
        for i in 0..10 {
            launcher.enqueue(i);
        }

        let stopped = Arc::new(AtomicBool::new(false));
        let launched = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&launched);
        let stop = Arc::clone(&stopped);
        let stats = launcher
            .run_while(
                4,
                || !stopped.load(Ordering::Acquire),
                move |i: usize| {
                    seen.lock().unwrap().push(i);
                    let stop = Arc::clone(&stop);
                    async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        stop.store(true, Ordering::Release);
                    }
                },
            )
            .await;

        assert_eq!(*launched.lock().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(stats.completed(), 4);
        assert_eq!(stats.skipped(), 6);
    }

    #[tokio::test]
    async fn test_empty_queue_finishes_immediately() {
        let launcher: ThrottledLauncher<usize> = ThrottledLauncher::new();
        assert!(launcher.is_empty());

        let stats = launcher.run_default(|_| async {}).await;
        assert_eq!(stats.started(), 0);
        assert_eq!(stats.completed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_limit_still_makes_progress() {
        let mut launcher = ThrottledLauncher::new();
        launcher.enqueue(());
        launcher.enqueue(());

        let stats = launcher.run(0, |_| async {}).await;
        assert_eq!(stats.completed(), 2);
        assert_eq!(stats.peak_in_flight(), 1);
    }
}

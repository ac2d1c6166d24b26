//! Bounded background processing queue.
//!
//! The queue is the single synchronization point between producers (any
//! thread) and the consumer task. The drop policy is "reject new, never
//! block the caller": `try_enqueue` is non-blocking and never errors, and
//! overflow is observable only through the dropped-item counter. The
//! consumer reports execution time and failures (including caught panics
//! from user-supplied jobs) to the statistics engine.
//!
//! Shutdown is cooperative with a timeout: stop accepting, drain what is
//! queued, then force-return reporting what was left.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::TelemetryError;
use crate::stats::StatsEngine;

/// An opaque background task with an operation-type tag.
pub struct WorkItem {
    kind: String,
    job: Box<dyn FnOnce() -> anyhow::Result<()> + Send>,
}

impl WorkItem {
    /// Create a work item with a kind tag for diagnostics.
    pub fn new(kind: impl Into<String>, job: impl FnOnce() -> anyhow::Result<()> + Send + 'static) -> Self {
        Self {
            kind: kind.into(),
            job: Box::new(job),
        }
    }

    /// The operation-type tag.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl std::fmt::Debug for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkItem").field("kind", &self.kind).finish()
    }
}

/// Worker construction knobs.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bounded queue capacity
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl WorkerConfig {
    /// Set the queue capacity.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

/// Outcome of a bounded flush wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Queue and in-flight work fully drained
    Drained,
    /// The timeout elapsed first
    TimedOut {
        /// Items still pending (queued plus in-flight)
        remaining: u64,
    },
}

/// Backpressure-aware background worker.
pub struct BackgroundWorker {
    tx: mpsc::Sender<WorkItem>,
    capacity: usize,
    accepting: AtomicBool,
    stats: Arc<StatsEngine>,
    // Pending = queued + in-flight; drained when it reaches zero.
    pending: Arc<watch::Sender<u64>>,
    shutdown: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundWorker {
    /// Spawn the consumer task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(config: WorkerConfig, stats: Arc<StatsEngine>) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let (pending_tx, _) = watch::channel(0_u64);
        let pending = Arc::new(pending_tx);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(consumer_loop(
            rx,
            Arc::clone(&stats),
            Arc::clone(&pending),
            shutdown_rx,
        ));

        Self {
            tx,
            capacity: config.queue_capacity,
            accepting: AtomicBool::new(true),
            stats,
            pending,
            shutdown: shutdown_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Offer an item to the queue.
    ///
    /// Returns `false` — and counts one dropped item — when the queue is
    /// full or the worker is shutting down. Never blocks and never errors.
    pub fn try_enqueue(&self, item: WorkItem) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            self.stats.item_dropped();
            return false;
        }
        // Reserve the slot first: the depth and pending counters must be
        // bumped before the item becomes visible to the consumer, or a
        // fast dequeue on another thread underflows them.
        match self.tx.try_reserve() {
            Ok(permit) => {
                self.stats.item_enqueued();
                self.pending.send_modify(|p| *p += 1);
                permit.send(item);
                true
            }
            Err(_) => {
                self.stats.item_dropped();
                false
            }
        }
    }

    /// Wait until all pending work drains or the timeout elapses.
    pub async fn flush(&self, timeout: Duration) -> FlushOutcome {
        let mut rx = self.pending.subscribe();
        let drained = tokio::time::timeout(timeout, async {
            while *rx.borrow_and_update() != 0 {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;

        match drained {
            Ok(()) => FlushOutcome::Drained,
            Err(_) => FlushOutcome::TimedOut {
                remaining: *self.pending.borrow(),
            },
        }
    }

    /// Stop accepting new items and attempt a bounded drain.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::ShutdownTimeout`] when queued items remain
    /// after the timeout; the consumer task is aborted in that case.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), TelemetryError> {
        self.accepting.store(false, Ordering::Release);
        let _ = self.shutdown.send(true);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(_) => {
                debug!("Background worker drained and stopped");
                Ok(())
            }
            Err(_) => {
                handle.abort();
                let remaining = *self.pending.borrow();
                warn!(remaining, "Background worker shutdown timed out");
                Err(TelemetryError::ShutdownTimeout { remaining })
            }
        }
    }

    /// Items pending (queued plus in-flight).
    #[must_use]
    pub fn pending(&self) -> u64 {
        *self.pending.borrow()
    }

    /// The bounded queue capacity this worker was constructed with.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.capacity
    }
}

impl Drop for BackgroundWorker {
    fn drop(&mut self) {
        // Best effort only; the graceful path is shutdown().
        self.accepting.store(false, Ordering::Release);
        if let Some(handle) = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}

async fn consumer_loop(
    mut rx: mpsc::Receiver<WorkItem>,
    stats: Arc<StatsEngine>,
    pending: Arc<watch::Sender<u64>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(item) = maybe else { break };
                process(item, &stats, &pending);
            }
            _ = shutdown.changed() => {
                // Close first so late producers are rejected, then drain to
                // completion: a permit reserved before the close can still
                // deliver, and recv returns None only once it has.
                rx.close();
                while let Some(item) = rx.recv().await {
                    process(item, &stats, &pending);
                }
                break;
            }
        }
    }
}

fn process(item: WorkItem, stats: &StatsEngine, pending: &watch::Sender<u64>) {
    stats.item_dequeued();
    let kind = item.kind;
    let started = Instant::now();

    match catch_unwind(AssertUnwindSafe(item.job)) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            stats.processing_error();
            warn!(kind = %kind, error = %e, "Background work item failed");
        }
        Err(_) => {
            stats.processing_error();
            warn!(kind = %kind, "Background work item panicked");
        }
    }

    stats.item_processed(started.elapsed());
    pending.send_modify(|p| *p = p.saturating_sub(1));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_drain() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(WorkerConfig::default(), Arc::clone(&stats));

        for i in 0..10 {
            assert!(worker.try_enqueue(WorkItem::new("test", move || {
                let _ = i;
                Ok(())
            })));
        }

        assert_eq!(worker.flush(Duration::from_secs(5)).await, FlushOutcome::Drained);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.items_enqueued, 10);
        assert_eq!(snapshot.items_processed, 10);
        assert_eq!(snapshot.items_dropped, 0);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(
            WorkerConfig::default().with_queue_capacity(16),
            Arc::clone(&stats),
        );

        // Slow the consumer down so the queue actually fills.
        let mut rejected = 0_u64;
        for _ in 0..200 {
            let accepted = worker.try_enqueue(WorkItem::new("slow", || {
                std::thread::sleep(Duration::from_millis(5));
                Ok(())
            }));
            if !accepted {
                rejected += 1;
            }
        }

        assert!(rejected > 0);
        assert_eq!(stats.items_dropped(), rejected);
        worker.shutdown(Duration::from_secs(10)).await.ok();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.items_processed + snapshot.items_dropped, 200);
    }

    #[tokio::test]
    async fn test_failing_job_counts_processing_error() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(WorkerConfig::default(), Arc::clone(&stats));

        worker.try_enqueue(WorkItem::new("bad", || {
            Err(anyhow::anyhow!("exporter unavailable"))
        }));
        worker.flush(Duration::from_secs(5)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.processing_errors, 1);
        assert_eq!(snapshot.items_processed, 1);
    }

    #[tokio::test]
    async fn test_panicking_job_does_not_kill_consumer() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(WorkerConfig::default(), Arc::clone(&stats));

        worker.try_enqueue(WorkItem::new("panic", || panic!("hook bug")));
        worker.try_enqueue(WorkItem::new("ok", || Ok(())));
        worker.flush(Duration::from_secs(5)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.items_processed, 2);
        assert_eq!(snapshot.processing_errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(WorkerConfig::default(), Arc::clone(&stats));

        worker.shutdown(Duration::from_secs(5)).await.unwrap();
        assert!(!worker.try_enqueue(WorkItem::new("late", || Ok(()))));
        assert_eq!(stats.items_dropped(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_flush_timeout_reports_remaining() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(
            WorkerConfig::default().with_queue_capacity(64),
            Arc::clone(&stats),
        );

        for _ in 0..8 {
            worker.try_enqueue(WorkItem::new("slow", || {
                std::thread::sleep(Duration::from_millis(50));
                Ok(())
            }));
        }

        match worker.flush(Duration::from_millis(10)).await {
            FlushOutcome::TimedOut { remaining } => assert!(remaining > 0),
            FlushOutcome::Drained => panic!("expected a timeout"),
        }
        worker.shutdown(Duration::from_secs(10)).await.ok();
    }

    // Fast no-op jobs from several threads make the consumer race every
    // enqueue; the depth and pending counters must stay exact throughout.
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_dequeue_keeps_counters_exact() {
        let stats = Arc::new(StatsEngine::new());
        let worker = Arc::new(BackgroundWorker::spawn(
            WorkerConfig::default().with_queue_capacity(64),
            Arc::clone(&stats),
        ));

        let producers: Vec<_> = (0..4)
            .map(|_| {
                let worker = Arc::clone(&worker);
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        worker.try_enqueue(WorkItem::new("noop", || Ok(())));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        assert_eq!(
            worker.flush(Duration::from_secs(30)).await,
            FlushOutcome::Drained
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.items_processed + snapshot.items_dropped, 40_000);
        assert_eq!(snapshot.items_processed, snapshot.items_enqueued);
        assert_eq!(snapshot.queue_depth, 0);
        assert!(snapshot.queue_depth_max <= 64 + 1);
        assert_eq!(worker.pending(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_items_accepted_during_shutdown_are_drained() {
        let stats = Arc::new(StatsEngine::new());
        let worker = Arc::new(BackgroundWorker::spawn(
            WorkerConfig::default().with_queue_capacity(256),
            Arc::clone(&stats),
        ));

        let producer = {
            let worker = Arc::clone(&worker);
            std::thread::spawn(move || {
                for _ in 0..50_000 {
                    worker.try_enqueue(WorkItem::new("noop", || Ok(())));
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        worker.shutdown(Duration::from_secs(10)).await.unwrap();
        producer.join().unwrap();

        // Everything accepted before the close was executed; nothing is
        // stranded in the channel.
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.items_processed, snapshot.items_enqueued);
        assert_eq!(snapshot.queue_depth, 0);
        assert_eq!(worker.pending(), 0);
    }

    #[tokio::test]
    async fn test_queue_capacity_is_reported() {
        let stats = Arc::new(StatsEngine::new());
        let worker = BackgroundWorker::spawn(
            WorkerConfig::default().with_queue_capacity(128),
            Arc::clone(&stats),
        );
        assert_eq!(worker.queue_capacity(), 128);
        worker.shutdown(Duration::from_secs(5)).await.ok();
    }
}

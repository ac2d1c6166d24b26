//! Lock-free telemetry statistics.
//!
//! Every counter is an `AtomicU64` updated with relaxed ordering; under no
//! circumstances does a counter update block a caller. The per-source
//! breakdown lives in a `DashMap` so concurrent sources touch disjoint
//! shards. `snapshot` produces an immutable, serializable copy for
//! health-check and diagnostics adapters; `reset` is administrative only.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Per-source operation counters.
#[derive(Debug, Default)]
struct SourceStats {
    created: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    duration_micros_total: AtomicU64,
}

/// Central statistics engine.
#[derive(Debug)]
pub struct StatsEngine {
    operations_created: AtomicU64,
    operations_completed: AtomicU64,
    operations_failed: AtomicU64,
    errors_recorded: AtomicU64,
    events_recorded: AtomicU64,
    metrics_recorded: AtomicU64,
    correlation_ids_generated: AtomicU64,
    queue_depth: AtomicU64,
    queue_depth_max: AtomicU64,
    items_enqueued: AtomicU64,
    items_processed: AtomicU64,
    items_dropped: AtomicU64,
    processing_errors: AtomicU64,
    processing_micros_total: AtomicU64,
    per_source: DashMap<String, Arc<SourceStats>>,
    epoch: Mutex<DateTime<Utc>>,
}

impl StatsEngine {
    /// Create a new engine with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            operations_created: AtomicU64::new(0),
            operations_completed: AtomicU64::new(0),
            operations_failed: AtomicU64::new(0),
            errors_recorded: AtomicU64::new(0),
            events_recorded: AtomicU64::new(0),
            metrics_recorded: AtomicU64::new(0),
            correlation_ids_generated: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            queue_depth_max: AtomicU64::new(0),
            items_enqueued: AtomicU64::new(0),
            items_processed: AtomicU64::new(0),
            items_dropped: AtomicU64::new(0),
            processing_errors: AtomicU64::new(0),
            processing_micros_total: AtomicU64::new(0),
            per_source: DashMap::new(),
            epoch: Mutex::new(Utc::now()),
        }
    }

    fn source(&self, source: &str) -> Arc<SourceStats> {
        if let Some(stats) = self.per_source.get(source) {
            return Arc::clone(&stats);
        }
        Arc::clone(
            &self
                .per_source
                .entry(source.to_string())
                .or_default(),
        )
    }

    /// Record a scope creation for a source.
    pub fn operation_created(&self, source: &str) {
        self.operations_created.fetch_add(1, Ordering::Relaxed);
        self.source(source).created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scope completion for a source.
    pub fn operation_completed(&self, source: &str, duration: Duration, failed: bool) {
        self.operations_completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.operations_failed.fetch_add(1, Ordering::Relaxed);
        }
        let stats = self.source(source);
        stats.completed.fetch_add(1, Ordering::Relaxed);
        if failed {
            stats.failed.fetch_add(1, Ordering::Relaxed);
        }
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        stats
            .duration_micros_total
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Record a captured error.
    pub fn error_recorded(&self) {
        self.errors_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scope event.
    pub fn event_recorded(&self) {
        self.events_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a scope metric.
    pub fn metric_recorded(&self) {
        self.metrics_recorded.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an auto-generated correlation identifier.
    pub fn correlation_id_generated(&self) {
        self.correlation_ids_generated
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful enqueue; tracks depth and its high-water mark.
    pub fn item_enqueued(&self) {
        self.items_enqueued.fetch_add(1, Ordering::Relaxed);
        let depth = self.queue_depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.queue_depth_max.fetch_max(depth, Ordering::Relaxed);
    }

    /// Record an item leaving the queue for execution.
    pub fn item_dequeued(&self) {
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a processed item and its execution time.
    pub fn item_processed(&self, duration: Duration) {
        self.items_processed.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.processing_micros_total
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Record a rejected (dropped) item.
    pub fn item_dropped(&self) {
        self.items_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed or panicked work item.
    pub fn processing_error(&self) {
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Scopes created but not yet completed.
    #[must_use]
    pub fn active_operations(&self) -> u64 {
        self.operations_created
            .load(Ordering::Relaxed)
            .saturating_sub(self.operations_completed.load(Ordering::Relaxed))
    }

    /// Current queue depth.
    #[must_use]
    pub fn queue_depth(&self) -> u64 {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Items dropped so far.
    #[must_use]
    pub fn items_dropped(&self) -> u64 {
        self.items_dropped.load(Ordering::Relaxed)
    }

    /// Produce an immutable point-in-time snapshot.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let completed = self.operations_completed.load(Ordering::Relaxed);
        let created = self.operations_created.load(Ordering::Relaxed);
        let processed = self.items_processed.load(Ordering::Relaxed);
        let processing_micros = self.processing_micros_total.load(Ordering::Relaxed);

        let per_source = self
            .per_source
            .iter()
            .map(|entry| {
                let stats = entry.value();
                let source_completed = stats.completed.load(Ordering::Relaxed);
                let micros = stats.duration_micros_total.load(Ordering::Relaxed);
                (
                    entry.key().clone(),
                    SourceSnapshot {
                        created: stats.created.load(Ordering::Relaxed),
                        completed: source_completed,
                        failed: stats.failed.load(Ordering::Relaxed),
                        average_duration_ms: average_ms(micros, source_completed),
                    },
                )
            })
            .collect();

        StatsSnapshot {
            taken_at: Utc::now(),
            epoch_started_at: *self.epoch.lock().unwrap_or_else(|e| e.into_inner()),
            operations_created: created,
            operations_completed: completed,
            operations_failed: self.operations_failed.load(Ordering::Relaxed),
            active_operations: created.saturating_sub(completed),
            errors_recorded: self.errors_recorded.load(Ordering::Relaxed),
            events_recorded: self.events_recorded.load(Ordering::Relaxed),
            metrics_recorded: self.metrics_recorded.load(Ordering::Relaxed),
            correlation_ids_generated: self.correlation_ids_generated.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            queue_depth_max: self.queue_depth_max.load(Ordering::Relaxed),
            items_enqueued: self.items_enqueued.load(Ordering::Relaxed),
            items_processed: processed,
            items_dropped: self.items_dropped.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
            average_processing_ms: average_ms(processing_micros, processed),
            per_source,
        }
    }

    /// Zero every counter and restart the epoch.
    ///
    /// Administrative use only; not part of steady-state operation.
    pub fn reset(&self) {
        self.operations_created.store(0, Ordering::Relaxed);
        self.operations_completed.store(0, Ordering::Relaxed);
        self.operations_failed.store(0, Ordering::Relaxed);
        self.errors_recorded.store(0, Ordering::Relaxed);
        self.events_recorded.store(0, Ordering::Relaxed);
        self.metrics_recorded.store(0, Ordering::Relaxed);
        self.correlation_ids_generated.store(0, Ordering::Relaxed);
        self.queue_depth.store(0, Ordering::Relaxed);
        self.queue_depth_max.store(0, Ordering::Relaxed);
        self.items_enqueued.store(0, Ordering::Relaxed);
        self.items_processed.store(0, Ordering::Relaxed);
        self.items_dropped.store(0, Ordering::Relaxed);
        self.processing_errors.store(0, Ordering::Relaxed);
        self.processing_micros_total.store(0, Ordering::Relaxed);
        self.per_source.clear();
        *self.epoch.lock().unwrap_or_else(|e| e.into_inner()) = Utc::now();
    }
}

impl Default for StatsEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn average_ms(total_micros: u64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        (total_micros as f64 / count as f64) / 1_000.0
    }
}

/// Immutable point-in-time statistics copy.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    /// When the snapshot was taken
    pub taken_at: DateTime<Utc>,
    /// When the current counting epoch started
    pub epoch_started_at: DateTime<Utc>,
    /// Scopes created
    pub operations_created: u64,
    /// Scopes completed
    pub operations_completed: u64,
    /// Scopes that completed failed
    pub operations_failed: u64,
    /// Scopes created but not yet completed
    pub active_operations: u64,
    /// Errors captured through scopes
    pub errors_recorded: u64,
    /// Scope events recorded
    pub events_recorded: u64,
    /// Scope metrics recorded
    pub metrics_recorded: u64,
    /// Correlation identifiers auto-generated
    pub correlation_ids_generated: u64,
    /// Current background queue depth
    pub queue_depth: u64,
    /// Historical queue depth high-water mark
    pub queue_depth_max: u64,
    /// Items accepted by the queue
    pub items_enqueued: u64,
    /// Items executed
    pub items_processed: u64,
    /// Items rejected at capacity
    pub items_dropped: u64,
    /// Items that failed or panicked during execution
    pub processing_errors: u64,
    /// Running average execution time in milliseconds
    pub average_processing_ms: f64,
    /// Per-source breakdown
    pub per_source: HashMap<String, SourceSnapshot>,
}

/// Per-source slice of a snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSnapshot {
    /// Scopes created for this source
    pub created: u64,
    /// Scopes completed for this source
    pub completed: u64,
    /// Failed completions for this source
    pub failed: u64,
    /// Average scope duration in milliseconds
    pub average_duration_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_lifecycle_counters() {
        let stats = StatsEngine::new();
        stats.operation_created("svc");
        stats.operation_created("svc");
        stats.operation_completed("svc", Duration::from_millis(10), false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.operations_created, 2);
        assert_eq!(snapshot.operations_completed, 1);
        assert_eq!(snapshot.active_operations, 1);
        assert_eq!(snapshot.operations_failed, 0);

        let source = &snapshot.per_source["svc"];
        assert_eq!(source.created, 2);
        assert_eq!(source.completed, 1);
        assert!(source.average_duration_ms >= 9.0);
    }

    #[test]
    fn test_queue_depth_high_water_mark() {
        let stats = StatsEngine::new();
        stats.item_enqueued();
        stats.item_enqueued();
        stats.item_enqueued();
        stats.item_dequeued();
        stats.item_enqueued();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.queue_depth, 3);
        assert_eq!(snapshot.queue_depth_max, 3);
        assert_eq!(snapshot.items_enqueued, 4);
    }

    #[test]
    fn test_average_processing_time() {
        let stats = StatsEngine::new();
        stats.item_processed(Duration::from_millis(2));
        stats.item_processed(Duration::from_millis(4));

        let snapshot = stats.snapshot();
        assert!((snapshot.average_processing_ms - 3.0).abs() < 0.5);
    }

    #[test]
    fn test_reset_restarts_epoch() {
        let stats = StatsEngine::new();
        stats.operation_created("svc");
        stats.item_dropped();
        let epoch_before = stats.snapshot().epoch_started_at;

        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.operations_created, 0);
        assert_eq!(snapshot.items_dropped, 0);
        assert!(snapshot.per_source.is_empty());
        assert!(snapshot.epoch_started_at >= epoch_before);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let stats = StatsEngine::new();
        stats.operation_created("svc");
        let snapshot = stats.snapshot();
        stats.operation_created("svc");
        assert_eq!(snapshot.operations_created, 1);
    }

    #[test]
    fn test_concurrent_increments() {
        let stats = Arc::new(StatsEngine::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = Arc::clone(&stats);
            handles.push(std::thread::spawn(move || {
                for _ in 0..1_000 {
                    stats.operation_created("load");
                    stats.operation_completed("load", Duration::from_micros(5), false);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.operations_created, 8_000);
        assert_eq!(snapshot.operations_completed, 8_000);
        assert_eq!(snapshot.active_operations, 0);
    }
}

//! Operation scopes.
//!
//! A scope wraps one instrumented unit of work: timing, tagging, error
//! capture and parent/child nesting. The lifecycle is
//! Pending → Succeeded | Failed → finished; finishing is idempotent and
//! never panics, even when user-supplied property factories misbehave.
//!
//! The performance contract lives here: cheap bookkeeping (statistics,
//! correlation) always happens; expensive emission (the tracing span,
//! lazy property evaluation, the export job) happens only when the scope
//! was sampled.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, warn};

use crate::config::EffectiveConfig;
use crate::stats::StatsEngine;
use crate::window::RollingWindow;
use crate::worker::{BackgroundWorker, WorkItem};

/// Current state of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeOutcome {
    /// Created, timer running
    Pending,
    /// Explicitly marked successful
    Succeeded,
    /// Explicitly failed or finished with a captured error
    Failed,
}

/// Structured capture of a failure.
#[derive(Debug, Clone, Serialize)]
pub struct CapturedError {
    /// Error type name
    pub kind: String,
    /// Error message, including the source chain
    pub message: String,
}

/// The serializable operation record handed to the exporter hook.
#[derive(Debug, Clone, Serialize)]
pub struct ExportRecord {
    /// Operation name
    pub name: String,
    /// Correlation identifier
    pub correlation_id: String,
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    /// Elapsed time in milliseconds
    pub duration_ms: f64,
    /// Final outcome
    pub outcome: ScopeOutcome,
    /// Captured error, if any
    pub error: Option<CapturedError>,
    /// Tags, including error and slow-operation tags
    pub tags: HashMap<String, String>,
    /// Lazily evaluated properties
    pub properties: HashMap<String, String>,
}

/// Exporter hook invoked on the background worker for sampled scopes.
pub type Exporter = dyn Fn(ExportRecord) + Send + Sync;

/// Dependencies a factory injects into every scope it creates.
pub(crate) struct ScopeEnv {
    pub(crate) stats: Arc<StatsEngine>,
    pub(crate) worker: Option<Arc<BackgroundWorker>>,
    pub(crate) error_window: Arc<RollingWindow>,
    pub(crate) exporter: Option<Arc<Exporter>>,
    pub(crate) source: String,
}

type PropertyFactory = Box<dyn FnOnce() -> String + Send>;

/// One instrumented unit of work.
///
/// Mutated only by the owning call stack; finalized exactly once, either
/// explicitly or on drop.
pub struct OperationScope {
    name: String,
    correlation_id: String,
    started: Instant,
    started_at: DateTime<Utc>,
    tags: HashMap<String, String>,
    properties: Vec<(String, PropertyFactory)>,
    outcome: ScopeOutcome,
    error: Option<CapturedError>,
    config: EffectiveConfig,
    sampled: bool,
    recorded: bool,
    span: Option<Span>,
    child_count: u64,
    finished: bool,
    env: Arc<ScopeEnv>,
}

impl OperationScope {
    pub(crate) fn new(
        name: String,
        correlation_id: String,
        config: EffectiveConfig,
        sampled: bool,
        recorded: bool,
        span: Option<Span>,
        env: Arc<ScopeEnv>,
    ) -> Self {
        let tags = config.tags.clone();
        if recorded {
            env.stats.operation_created(&env.source);
        }
        Self {
            name,
            correlation_id,
            started: Instant::now(),
            started_at: Utc::now(),
            tags,
            properties: Vec::new(),
            outcome: ScopeOutcome::Pending,
            error: None,
            config,
            sampled,
            recorded,
            span,
            child_count: 0,
            finished: false,
            env,
        }
    }

    /// Operation name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Correlation identifier this scope carries.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Current outcome.
    #[must_use]
    pub const fn outcome(&self) -> ScopeOutcome {
        self.outcome
    }

    /// Whether this scope emits a trace span and an export record.
    #[must_use]
    pub const fn is_sampled(&self) -> bool {
        self.sampled
    }

    /// Tags accumulated so far.
    #[must_use]
    pub const fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }

    /// Add a tag. Ignored after the scope has finished.
    pub fn tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        if !self.finished {
            self.tags.insert(key.into(), value.into());
        }
    }

    /// Defer a property to finish time.
    ///
    /// The factory runs exactly once, at finish, and only when the scope
    /// was sampled, so expensive computations are skipped for unsampled
    /// scopes. A panicking factory is suppressed with a fallback tag.
    pub fn with_property(
        &mut self,
        key: impl Into<String>,
        factory: impl FnOnce() -> String + Send + 'static,
    ) {
        if !self.finished {
            self.properties.push((key.into(), Box::new(factory)));
        }
    }

    /// Record a point event inside this operation.
    pub fn record_event(&mut self, name: &str) {
        if self.finished {
            return;
        }
        if self.recorded {
            self.env.stats.event_recorded();
        }
        if let Some(span) = &self.span {
            span.in_scope(|| tracing::info!(event = %name, "operation event"));
        }
    }

    /// Record a named measurement inside this operation.
    pub fn record_metric(&mut self, name: &str, value: f64) {
        if self.finished {
            return;
        }
        if self.recorded {
            self.env.stats.metric_recorded();
        }
        if let Some(span) = &self.span {
            span.in_scope(|| tracing::info!(metric = %name, value, "operation metric"));
        }
    }

    /// Mark the operation successful.
    pub fn succeed(&mut self) {
        if !self.finished && self.outcome == ScopeOutcome::Pending {
            self.outcome = ScopeOutcome::Succeeded;
        }
    }

    /// Mark the operation failed, capturing the error's type, message and
    /// source chain as structured tags.
    pub fn fail<E>(&mut self, error: &E)
    where
        E: std::error::Error + ?Sized,
    {
        let mut message = error.to_string();
        let mut cause = error.source();
        while let Some(source) = cause {
            message.push_str(": ");
            message.push_str(&source.to_string());
            cause = source.source();
        }
        self.fail_parts(std::any::type_name::<E>().to_string(), message);
    }

    /// Mark the operation failed with a bare message.
    pub fn fail_message(&mut self, message: impl Into<String>) {
        self.fail_parts("error".to_string(), message.into());
    }

    fn fail_parts(&mut self, kind: String, message: String) {
        if self.finished {
            return;
        }
        self.outcome = ScopeOutcome::Failed;
        self.tags.insert("error.kind".to_string(), kind.clone());
        self.tags
            .insert("error.message".to_string(), message.clone());
        self.error = Some(CapturedError { kind, message });

        if self.recorded && self.config.record_errors {
            self.env.stats.error_recorded();
            self.env.error_window.record();
        }
    }

    /// Create a child scope.
    ///
    /// The child shares this scope's correlation identifier and effective
    /// configuration, starts an independent timer, and parents its trace
    /// span to this scope's span. Tags do not propagate in either
    /// direction.
    #[must_use]
    pub fn child(&mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.child_count += 1;
        let span = if self.sampled {
            self.span.as_ref().map(|parent| {
                tracing::info_span!(
                    parent: parent,
                    "operation",
                    operation = %name,
                    correlation_id = %self.correlation_id,
                )
            })
        } else {
            None
        };
        let mut child = Self::new(
            name,
            self.correlation_id.clone(),
            self.config.clone(),
            self.sampled,
            self.recorded,
            span,
            Arc::clone(&self.env),
        );
        // Children start from the configured static tags only.
        child.tags = self.config.tags.clone();
        child
    }

    /// Finalize the scope. Idempotent; a second call is a no-op.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if self.outcome == ScopeOutcome::Pending {
            self.outcome = ScopeOutcome::Succeeded;
        }
        let elapsed = self.started.elapsed();
        let duration_ms = elapsed.as_secs_f64() * 1_000.0;

        if let Some(threshold) = self.config.slow_threshold_ms {
            if elapsed.as_millis() > u128::from(threshold) {
                self.tags
                    .insert("operation.slow".to_string(), "true".to_string());
                warn!(
                    operation = %self.name,
                    correlation_id = %self.correlation_id,
                    duration_ms,
                    threshold_ms = threshold,
                    "Slow operation"
                );
            }
        }

        if self.child_count > 0 {
            self.tags
                .insert("children".to_string(), self.child_count.to_string());
        }

        let mut properties = HashMap::new();
        if self.sampled {
            for (key, factory) in self.properties.drain(..) {
                match catch_unwind(AssertUnwindSafe(factory)) {
                    Ok(value) => {
                        properties.insert(key, value);
                    }
                    Err(_) => {
                        // A misbehaving factory must not break finalization.
                        properties.insert(key, "<property evaluation failed>".to_string());
                    }
                }
            }
        } else {
            self.properties.clear();
        }

        if let Some(span) = self.span.take() {
            span.in_scope(|| {
                tracing::info!(
                    duration_ms,
                    outcome = ?self.outcome,
                    failed = self.outcome == ScopeOutcome::Failed,
                    "operation finished"
                );
            });
        }

        if self.recorded {
            self.env.stats.operation_completed(
                &self.env.source,
                elapsed,
                self.outcome == ScopeOutcome::Failed,
            );
        }

        if self.sampled {
            if let (Some(worker), Some(exporter)) = (&self.env.worker, &self.env.exporter) {
                let record = ExportRecord {
                    name: self.name.clone(),
                    correlation_id: self.correlation_id.clone(),
                    started_at: self.started_at,
                    duration_ms,
                    outcome: self.outcome,
                    error: self.error.clone(),
                    tags: std::mem::take(&mut self.tags),
                    properties,
                };
                let exporter = Arc::clone(exporter);
                // Overflow is observable only through the dropped counter.
                let _ = worker.try_enqueue(WorkItem::new("export", move || {
                    exporter(record);
                    Ok(())
                }));
            }
        }
    }
}

impl Drop for OperationScope {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for OperationScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationScope")
            .field("name", &self.name)
            .field("correlation_id", &self.correlation_id)
            .field("outcome", &self.outcome)
            .field("sampled", &self.sampled)
            .field("finished", &self.finished)
            .finish()
    }
}

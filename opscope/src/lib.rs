//! In-process observability core.
//!
//! This crate turns ad-hoc application code into a stream of correlated,
//! sampled, tagged operation records. It provides:
//! - Ambient correlation-identifier propagation across async continuations
//! - Operation scopes with timing, tagging, error capture and nesting
//! - A layered, hot-reloadable configuration engine with lock-free reads
//! - Lock-free statistics with rolling-rate windows
//! - A bounded, backpressure-aware background worker for export jobs
//! - A minimal HTTP endpoint for live configuration
//!
//! Vendor exporters, web-host wiring and log-sink enrichers are external
//! adapters consuming these surfaces; they are not part of this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod correlation;
pub mod error;
pub mod factory;
pub mod http;
pub mod logging;
pub mod scope;
pub mod stats;
pub mod telemetry;
pub mod window;
pub mod worker;

pub use config::{
    CaptureMode, ConfigDocument, ConfigEngine, ConfigLevel, ConfigSource, EffectiveConfig,
    FileReloader, LayerContribution, OperationConfig, ReloaderConfig,
};
pub use correlation::{CorrelationContext, CorrelationScope};
pub use error::TelemetryError;
pub use factory::{BeginOptions, ScopeFactory};
pub use logging::{LoggingConfig, init_logging};
pub use scope::{ExportRecord, OperationScope, ScopeOutcome};
pub use stats::{StatsEngine, StatsSnapshot};
pub use telemetry::{Telemetry, TelemetryConfig};
pub use window::RollingWindow;
pub use worker::{BackgroundWorker, FlushOutcome, WorkItem, WorkerConfig};

//! Process-wide telemetry handle.
//!
//! A single explicitly initialized handle bundles the configuration
//! engine, statistics, background worker, error window and scope factory.
//! The lifecycle is documented and guarded: `initialize` fails on double
//! initialization, `shutdown` drains the worker with a bounded timeout and
//! tears the global down so a fresh `initialize` is possible (tests,
//! embedders with their own lifecycle).

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{ConfigEngine, FileReloader, ReloaderConfig, ReloaderHandle};
use crate::error::TelemetryError;
use crate::factory::ScopeFactory;
use crate::logging::{LoggingConfig, init_logging};
use crate::scope::Exporter;
use crate::stats::{StatsEngine, StatsSnapshot};
use crate::window::RollingWindow;
use crate::worker::{BackgroundWorker, WorkerConfig};

static GLOBAL: RwLock<Option<Arc<Telemetry>>> = RwLock::new(None);

/// Construction options for [`Telemetry::initialize`].
pub struct TelemetryConfig {
    service_name: String,
    worker: WorkerConfig,
    error_window: Duration,
    config_file: Option<PathBuf>,
    reloader: ReloaderConfig,
    exporter: Option<Arc<Exporter>>,
    logging: Option<LoggingConfig>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "service".to_string(),
            worker: WorkerConfig::default(),
            error_window: Duration::from_secs(60),
            config_file: None,
            reloader: ReloaderConfig::default(),
            exporter: None,
            logging: None,
        }
    }
}

impl TelemetryConfig {
    /// Create defaults for a named service.
    #[must_use]
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }

    /// Set worker options.
    #[must_use]
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = worker;
        self
    }

    /// Set the error-rate window duration.
    #[must_use]
    pub const fn with_error_window(mut self, window: Duration) -> Self {
        self.error_window = window;
        self
    }

    /// Watch this file for hot-reloadable configuration.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Set reload behavior knobs.
    #[must_use]
    pub fn with_reloader(mut self, reloader: ReloaderConfig) -> Self {
        self.reloader = reloader;
        self
    }

    /// Register an exporter hook; sampled scopes enqueue export jobs to it.
    #[must_use]
    pub fn with_exporter(mut self, exporter: Arc<Exporter>) -> Self {
        self.exporter = Some(exporter);
        self
    }

    /// Install the bundled tracing subscriber during initialization.
    ///
    /// The service name defaults to this config's when unset. Embedders
    /// with their own subscriber simply omit this.
    #[must_use]
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }
}

impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("service_name", &self.service_name)
            .field("worker", &self.worker)
            .field("error_window", &self.error_window)
            .field("config_file", &self.config_file)
            .field("logging", &self.logging)
            .finish()
    }
}

/// The process-wide telemetry instance.
pub struct Telemetry {
    factory: ScopeFactory,
    config: Arc<ConfigEngine>,
    stats: Arc<StatsEngine>,
    worker: Arc<BackgroundWorker>,
    error_window: Arc<RollingWindow>,
    reloader: Mutex<Option<ReloaderHandle>>,
}

impl Telemetry {
    /// Initialize the process-wide handle.
    ///
    /// Must be called inside a tokio runtime (the worker and reloader
    /// spawn background tasks). A missing or invalid configuration file is
    /// logged and skipped; the engine starts from code defaults and the
    /// watcher still installs so a later valid write takes effect. A
    /// `worker.queue_capacity` in the file overrides the code default at
    /// construction; later reloads do not resize a live queue.
    ///
    /// # Errors
    ///
    /// Fails with [`TelemetryError::AlreadyInitialized`] on a second call
    /// without an intervening [`Telemetry::shutdown`].
    pub fn initialize(config: TelemetryConfig) -> Result<Arc<Self>, TelemetryError> {
        let mut global = GLOBAL.write().unwrap_or_else(|e| e.into_inner());
        if global.is_some() {
            return Err(TelemetryError::AlreadyInitialized);
        }

        if let Some(logging) = &config.logging {
            let logging = if logging.service_name == LoggingConfig::default().service_name {
                logging.clone().with_service_name(&config.service_name)
            } else {
                logging.clone()
            };
            if !init_logging(&logging) {
                warn!("A tracing subscriber is already installed; keeping it");
            }
        }

        let engine = Arc::new(ConfigEngine::new());
        let stats = Arc::new(StatsEngine::new());
        let error_window = Arc::new(RollingWindow::new(config.error_window));

        let mut worker_config = config.worker;
        let reloader = match config.config_file {
            Some(path) => {
                let reloader = FileReloader::new(path, Arc::clone(&engine))
                    .with_config(config.reloader);
                match reloader.load_now() {
                    Ok(doc) => {
                        // Construction-time option: the file layer decides
                        // the queue size when it names one.
                        if let Some(capacity) =
                            doc.worker.as_ref().and_then(|w| w.queue_capacity)
                        {
                            worker_config = worker_config.with_queue_capacity(capacity);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Initial configuration load failed; starting from code defaults");
                    }
                }
                match reloader.spawn() {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        warn!(error = %e, "Configuration watcher could not be installed");
                        None
                    }
                }
            }
            None => None,
        };

        let worker = Arc::new(BackgroundWorker::spawn(worker_config, Arc::clone(&stats)));

        let factory = ScopeFactory::new(
            config.service_name.clone(),
            Arc::clone(&engine),
            Arc::clone(&stats),
            Some(Arc::clone(&worker)),
            Arc::clone(&error_window),
            config.exporter,
        );

        let telemetry = Arc::new(Self {
            factory,
            config: engine,
            stats,
            worker,
            error_window,
            reloader: Mutex::new(reloader),
        });
        *global = Some(Arc::clone(&telemetry));
        info!(service = %config.service_name, "Telemetry initialized");
        Ok(telemetry)
    }

    /// The process-wide handle, if initialized.
    ///
    /// # Errors
    ///
    /// Fails with [`TelemetryError::NotInitialized`] before `initialize`.
    pub fn global() -> Result<Arc<Self>, TelemetryError> {
        GLOBAL
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(TelemetryError::NotInitialized)
    }

    /// Tear down the process-wide handle.
    ///
    /// Stops the reloader, then drains the worker with a bounded timeout.
    /// The global slot is cleared even when the drain times out.
    ///
    /// # Errors
    ///
    /// Propagates [`TelemetryError::ShutdownTimeout`] from the worker.
    pub async fn shutdown(timeout: Duration) -> Result<(), TelemetryError> {
        let taken = GLOBAL
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(telemetry) = taken else {
            return Err(TelemetryError::NotInitialized);
        };

        if let Some(handle) = telemetry
            .reloader
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.stop();
        }

        let result = telemetry.worker.shutdown(timeout).await;
        info!("Telemetry shut down");
        result
    }

    /// The scope factory.
    #[must_use]
    pub fn factory(&self) -> &ScopeFactory {
        &self.factory
    }

    /// The configuration engine.
    #[must_use]
    pub fn config(&self) -> &Arc<ConfigEngine> {
        &self.config
    }

    /// The statistics engine.
    #[must_use]
    pub fn stats(&self) -> &Arc<StatsEngine> {
        &self.stats
    }

    /// The background worker.
    #[must_use]
    pub fn worker(&self) -> &Arc<BackgroundWorker> {
        &self.worker
    }

    /// Point-in-time statistics snapshot for health-check adapters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Error rate over the rolling window, in errors/second.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.error_window.rate()
    }
}

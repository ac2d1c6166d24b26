//! Hot reload of the file-backed configuration layer.
//!
//! A [`notify`] watcher feeds change events into a background task that
//! debounces rapid successive notifications into one reload, retries
//! transient read failures a bounded number of times with a fixed delay,
//! and applies only documents that pass validation. An invalid document is
//! rejected: the previously active configuration stays live and no change
//! notification fires. If the file stays invalid the system simply keeps
//! running on the last-known-good configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::file::load_document;
use crate::config::schema::{ConfigDocument, ConfigSource};
use crate::config::store::ConfigEngine;
use crate::error::TelemetryError;

/// Reload behavior knobs.
#[derive(Debug, Clone)]
pub struct ReloaderConfig {
    /// Quiet period collapsing a burst of change events into one reload
    pub debounce: Duration,
    /// Retry budget for transient read failures
    pub max_retries: u32,
    /// Fixed delay between retries
    pub retry_delay: Duration,
}

impl Default for ReloaderConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
        }
    }
}

impl ReloaderConfig {
    /// Set the debounce window.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the fixed retry delay.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Watches a configuration file and applies validated documents.
pub struct FileReloader {
    path: PathBuf,
    engine: Arc<ConfigEngine>,
    config: ReloaderConfig,
}

impl FileReloader {
    /// Create a reloader for the given path and engine.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, engine: Arc<ConfigEngine>) -> Self {
        Self {
            path: path.into(),
            engine,
            config: ReloaderConfig::default(),
        }
    }

    /// Override the reload knobs.
    #[must_use]
    pub fn with_config(mut self, config: ReloaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the file once, synchronously from the caller's perspective.
    ///
    /// Used at startup so the file layer is populated before the watcher
    /// takes over; the applied document is returned so construction-time
    /// options (worker capacity) can be read from it.
    ///
    /// # Errors
    ///
    /// Propagates read/parse/validation failures; nothing is applied on
    /// failure.
    pub fn load_now(&self) -> Result<ConfigDocument, TelemetryError> {
        let doc = load_document(&self.path)?;
        self.engine.apply_document(&doc, ConfigSource::File)?;
        info!(path = %self.path.display(), "Configuration file loaded");
        Ok(doc)
    }

    /// Install the watcher and spawn the reload task.
    ///
    /// # Errors
    ///
    /// Returns a watch error if the path cannot be watched.
    pub fn spawn(self) -> Result<ReloaderHandle, TelemetryError> {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<()>();

        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => error!(error = %e, "Configuration watch error"),
            })?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        info!(path = %self.path.display(), "Configuration watcher started");

        let task = tokio::spawn(reload_loop(
            self.path,
            self.engine,
            self.config,
            event_rx,
        ));

        Ok(ReloaderHandle {
            _watcher: watcher,
            task,
        })
    }
}

/// Keeps the watcher and the reload task alive.
pub struct ReloaderHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl ReloaderHandle {
    /// Stop watching and cancel the reload task.
    pub fn stop(self) {
        self.task.abort();
    }
}

async fn reload_loop(
    path: PathBuf,
    engine: Arc<ConfigEngine>,
    config: ReloaderConfig,
    mut events: mpsc::UnboundedReceiver<()>,
) {
    while events.recv().await.is_some() {
        // Debounce: absorb the burst, then drain whatever queued up.
        tokio::time::sleep(config.debounce).await;
        while events.try_recv().is_ok() {}

        let applied = load_with_retries(&path, &config)
            .await
            .and_then(|doc| engine.apply_document(&doc, ConfigSource::File));
        match applied {
            Ok(()) => {
                info!(path = %path.display(), "Configuration reloaded");
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Configuration reload rejected; keeping previous configuration"
                );
            }
        }
    }
}

/// Load the document, retrying transient read failures only.
///
/// Parse and validation failures are final: the file content is wrong, not
/// momentarily unavailable.
async fn load_with_retries(
    path: &Path,
    config: &ReloaderConfig,
) -> Result<ConfigDocument, TelemetryError> {
    let mut attempt = 0;
    loop {
        match load_document(path) {
            Ok(doc) => return Ok(doc),
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                debug!(
                    attempt,
                    max_retries = config.max_retries,
                    "Transient configuration read failure, retrying"
                );
                tokio::time::sleep(config.retry_delay).await;
            }
            Err(e) if e.is_retryable() => {
                return Err(TelemetryError::ReloadFailed {
                    attempts: attempt + 1,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

//! Scope creation.
//!
//! The factory composes the configuration engine, the correlation context,
//! the statistics engine and the background worker into the per-call
//! lifecycle: resolve effective configuration, resolve or generate the
//! correlation identifier, roll the sampling gate, open a trace span only
//! when sampled, and register creation with statistics.

use std::sync::Arc;

use crate::config::{ConfigEngine, OperationConfig};
use crate::correlation::CorrelationContext;
use crate::error::TelemetryError;
use crate::scope::{Exporter, OperationScope, ScopeEnv};
use crate::stats::StatsEngine;
use crate::window::RollingWindow;
use crate::worker::BackgroundWorker;

/// Per-call options for [`ScopeFactory::begin_with`].
#[derive(Default)]
pub struct BeginOptions {
    type_key: Option<String>,
    method: Option<String>,
    call_override: Option<OperationConfig>,
    correlation_id: Option<String>,
}

impl BeginOptions {
    /// Create empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve configuration for this registered type key.
    #[must_use]
    pub fn for_type(mut self, type_key: impl Into<String>) -> Self {
        self.type_key = Some(type_key.into());
        self
    }

    /// Resolve configuration for this method of the type key.
    #[must_use]
    pub fn for_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Ad-hoc call-site override, merged as the most specific layer.
    #[must_use]
    pub fn with_override(mut self, config: OperationConfig) -> Self {
        self.call_override = Some(config);
        self
    }

    /// Use an explicit correlation identifier instead of the ambient one.
    #[must_use]
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Creates operation scopes wired to the core subsystems.
pub struct ScopeFactory {
    config: Arc<ConfigEngine>,
    env: Arc<ScopeEnv>,
}

impl ScopeFactory {
    /// Build a factory.
    ///
    /// `source` names this service/component in per-source statistics.
    /// Without a worker and exporter, sampled scopes still emit spans but
    /// no export jobs are enqueued.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        config: Arc<ConfigEngine>,
        stats: Arc<StatsEngine>,
        worker: Option<Arc<BackgroundWorker>>,
        error_window: Arc<RollingWindow>,
        exporter: Option<Arc<Exporter>>,
    ) -> Self {
        Self {
            config,
            env: Arc::new(ScopeEnv {
                stats,
                worker,
                error_window,
                exporter,
                source: source.into(),
            }),
        }
    }

    /// Begin an operation with default options.
    ///
    /// # Errors
    ///
    /// Fails fast on an empty operation name.
    pub fn begin(&self, name: &str) -> Result<OperationScope, TelemetryError> {
        self.begin_with(name, BeginOptions::default())
    }

    /// Begin an operation.
    ///
    /// # Errors
    ///
    /// Fails fast on an empty operation name.
    pub fn begin_with(
        &self,
        name: &str,
        options: BeginOptions,
    ) -> Result<OperationScope, TelemetryError> {
        if name.trim().is_empty() {
            return Err(TelemetryError::invalid_input(
                "operation name must not be empty",
            ));
        }

        let effective = self.config.effective(
            options.type_key.as_deref(),
            options.method.as_deref(),
            options.call_override.as_ref(),
        );

        let correlation_id = match options.correlation_id {
            Some(id) => id,
            None => match CorrelationContext::get() {
                Some(id) => id,
                None => {
                    let id = CorrelationContext::current();
                    self.env.stats.correlation_id_generated();
                    id
                }
            },
        };

        let recorded = effective.enabled;
        // The sampling gate runs before any expensive work: an unsampled
        // scope never opens a span, evaluates properties, or exports.
        let sampled = recorded && rand::random::<f64>() < effective.sampling_rate;
        let span = if sampled {
            Some(tracing::info_span!(
                "operation",
                operation = %name,
                correlation_id = %correlation_id,
                source = %self.env.source,
            ))
        } else {
            None
        };

        Ok(OperationScope::new(
            name.to_string(),
            correlation_id,
            effective,
            sampled,
            recorded,
            span,
            Arc::clone(&self.env),
        ))
    }

    /// Run a closure inside a scope with automatic success/fail marking.
    ///
    /// # Errors
    ///
    /// Propagates the closure's error after marking the scope failed.
    pub fn execute<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut OperationScope) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut scope = self.begin(name)?;
        match f(&mut scope) {
            Ok(value) => {
                scope.succeed();
                Ok(value)
            }
            Err(e) => {
                scope.fail_message(format!("{e:#}"));
                Err(e)
            }
        }
    }

    /// Await a future inside a scope with automatic success/fail marking.
    ///
    /// # Errors
    ///
    /// Propagates the future's error after marking the scope failed.
    pub async fn execute_async<T, Fut>(&self, name: &str, fut: Fut) -> anyhow::Result<T>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut scope = self.begin(name)?;
        match fut.await {
            Ok(value) => {
                scope.succeed();
                Ok(value)
            }
            Err(e) => {
                scope.fail_message(format!("{e:#}"));
                Err(e)
            }
        }
    }

    /// Error rate over the configured rolling window, in errors/second.
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        self.env.error_window.rate()
    }

    pub(crate) fn env(&self) -> &Arc<ScopeEnv> {
        &self.env
    }
}

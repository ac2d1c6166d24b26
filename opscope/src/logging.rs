//! Structured logging bootstrap.
//!
//! Optional convenience for binaries that do not install their own
//! `tracing` subscriber. Library code only ever emits through the
//! `tracing` macros; embedders that already run a subscriber skip this
//! module entirely, and [`init_logging`] steps aside (returning `false`)
//! when a global subscriber exists.

use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Options for [`init_logging`].
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Service name stamped on the initialization event
    pub service_name: String,
    /// Default filter directive when `RUST_LOG` is unset
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            service_name: "opscope".to_string(),
            log_level: "info".to_string(),
            json_output: false,
        }
    }
}

impl LoggingConfig {
    /// Set the service name.
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Set the fallback filter directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Switch to JSON output.
    #[must_use]
    pub const fn with_json_output(mut self) -> Self {
        self.json_output = true;
        self
    }
}

/// Install the global tracing subscriber and stamp the service identity.
///
/// `RUST_LOG` overrides the configured level. Returns `false` when a
/// global subscriber is already installed; the existing one is kept and
/// nothing else happens.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let installed = if config.json_output {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true),
            )
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .is_ok()
    };

    if installed {
        info!(
            service = %config.service_name,
            level = %config.log_level,
            json = config.json_output,
            "Structured logging initialized"
        );
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = LoggingConfig::default()
            .with_service_name("orders")
            .with_log_level("debug")
            .with_json_output();

        assert_eq!(config.service_name, "orders");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_output);
    }

    #[test]
    fn test_reinstall_keeps_existing_subscriber() {
        let config = LoggingConfig::default();
        // Another test in this binary may already have installed one; the
        // second call in a row must always yield to it.
        let _ = init_logging(&config);
        assert!(!init_logging(&config));
    }
}

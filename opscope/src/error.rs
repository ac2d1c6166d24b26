//! Centralized error types for the observability core.
//!
//! This module provides a unified error type covering the four failure
//! categories the core distinguishes: caller-input errors (fail fast),
//! transient environment errors (retried, then surfaced), overload
//! conditions (never errors at all, only counters), and user-hook failures
//! (caught and suppressed at the call site).

use thiserror::Error;

use crate::config::ValidationError;

/// Common error type for telemetry core operations.
///
/// Overload conditions (a full work queue) are deliberately absent: the
/// hot-path enqueue contract is a boolean plus a dropped-item counter,
/// never an error.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// Invalid caller input (empty operation name, out-of-range value)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The process-wide telemetry handle was initialized twice
    #[error("Telemetry already initialized; call shutdown() first")]
    AlreadyInitialized,

    /// The process-wide telemetry handle is not initialized
    #[error("Telemetry not initialized")]
    NotInitialized,

    /// Reading the configuration file failed
    #[error("Configuration file error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration document is not valid JSON
    #[error("Configuration parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration document failed semantic validation
    #[error("Configuration validation failed: {}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    /// The file watcher could not be installed
    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A reload gave up after exhausting its retry budget
    #[error("Configuration reload failed after {attempts} attempts: {reason}")]
    ReloadFailed {
        /// Number of attempts made before giving up
        attempts: u32,
        /// Description of the last failure
        reason: String,
    },

    /// Graceful shutdown did not drain within its timeout
    #[error("Shutdown timed out with {remaining} queued items undrained")]
    ShutdownTimeout {
        /// Items still queued when the timeout expired
        remaining: u64,
    },
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl TelemetryError {
    /// Check if this error is transient and worth retrying.
    ///
    /// Only environment errors (a file momentarily locked mid-write)
    /// qualify; input and lifecycle errors never do.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Create an invalid input error with the given message.
    #[must_use]
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

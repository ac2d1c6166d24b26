//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees syntactically.
//! Validation is a pure function over a document and returns all errors,
//! not just the first; it runs before a document is accepted into the
//! engine, so an invalid reload can be rejected wholesale while the
//! previously active configuration stays live.

use thiserror::Error;

use crate::config::schema::{ConfigDocument, OperationConfig};

/// Minimum accepted worker queue capacity.
pub const QUEUE_CAPACITY_FLOOR: usize = 16;

/// A single semantic validation failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Sampling rate outside the closed unit interval
    #[error("sampling rate {value} for '{scope}' is outside [0, 1]")]
    SamplingRate {
        /// Which section/key carried the bad value
        scope: String,
        /// The offending value
        value: f64,
    },

    /// Zero slow-operation threshold
    #[error("slow threshold for '{scope}' must be greater than 0")]
    SlowThreshold {
        /// Which section/key carried the bad value
        scope: String,
    },

    /// Worker queue capacity below the floor
    #[error("worker queue capacity {value} is below the floor of {floor}")]
    QueueCapacity {
        /// The offending value
        value: usize,
        /// The enforced floor
        floor: usize,
    },
}

/// Validate one sparse configuration record.
///
/// `scope` names the section and key for error messages.
#[must_use]
pub fn validate_operation_config(scope: &str, config: &OperationConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Some(rate) = config.sampling_rate {
        if !(0.0..=1.0).contains(&rate) {
            errors.push(ValidationError::SamplingRate {
                scope: scope.to_string(),
                value: rate,
            });
        }
    }

    if config.slow_threshold_ms == Some(0) {
        errors.push(ValidationError::SlowThreshold {
            scope: scope.to_string(),
        });
    }

    errors
}

/// Validate a full document, collecting every error.
///
/// # Errors
///
/// Returns all semantic failures found anywhere in the document.
pub fn validate_document(doc: &ConfigDocument) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(global) = &doc.global {
        errors.extend(validate_operation_config("global", global));
    }
    for (pattern, config) in &doc.namespaces {
        errors.extend(validate_operation_config(
            &format!("namespaces.{pattern}"),
            config,
        ));
    }
    for (key, config) in &doc.types {
        errors.extend(validate_operation_config(&format!("types.{key}"), config));
    }
    for (key, config) in &doc.methods {
        errors.extend(validate_operation_config(&format!("methods.{key}"), config));
    }

    if let Some(capacity) = doc.worker.as_ref().and_then(|w| w.queue_capacity) {
        if capacity < QUEUE_CAPACITY_FLOOR {
            errors.push(ValidationError::QueueCapacity {
                value: capacity,
                floor: QUEUE_CAPACITY_FLOOR,
            });
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

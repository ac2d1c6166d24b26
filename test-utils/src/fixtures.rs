//! Test fixtures with sample configuration data.
//!
//! This module provides pre-built configuration documents for use in tests,
//! both as typed values and as the JSON text a configuration file would hold.

use opscope::config::{CaptureMode, ConfigDocument, OperationConfig};

/// A layered document exercising every level: global defaults, a wildcard
/// namespace, a type entry and a method entry.
#[must_use]
pub fn layered_document() -> ConfigDocument {
    let mut doc = ConfigDocument::default();
    doc.global = Some(
        OperationConfig::new()
            .with_enabled(true)
            .with_sampling_rate(1.0)
            .with_capture_mode(CaptureMode::Off),
    );
    doc.namespaces.insert(
        "payments.*".to_string(),
        OperationConfig::new().with_sampling_rate(0.5),
    );
    doc.types.insert(
        "payments.checkout.CartService".to_string(),
        OperationConfig::new()
            .with_capture_mode(CaptureMode::Redacted)
            .with_slow_threshold_ms(250),
    );
    doc.methods.insert(
        "payments.checkout.CartService::submit".to_string(),
        OperationConfig::new().with_sampling_rate(1.0),
    );
    doc
}

/// JSON text equivalent of [`layered_document`], as a config file would hold.
#[must_use]
pub fn layered_document_json() -> String {
    serde_json::json!({
        "global": {
            "enabled": true,
            "sampling_rate": 1.0,
            "capture_mode": "off"
        },
        "namespaces": {
            "payments.*": { "sampling_rate": 0.5 }
        },
        "types": {
            "payments.checkout.CartService": {
                "capture_mode": "redacted",
                "slow_threshold_ms": 250
            }
        },
        "methods": {
            "payments.checkout.CartService::submit": { "sampling_rate": 1.0 }
        }
    })
    .to_string()
}

/// A document that fails validation (sampling rate out of range and a
/// zero slow threshold).
#[must_use]
pub fn invalid_document() -> ConfigDocument {
    let mut doc = ConfigDocument::default();
    doc.global = Some(OperationConfig::new().with_sampling_rate(1.5));
    doc.types.insert(
        "payments.checkout.CartService".to_string(),
        OperationConfig::new().with_slow_threshold_ms(0),
    );
    doc
}

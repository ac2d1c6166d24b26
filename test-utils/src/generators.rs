//! Shared proptest generators for configuration domain types.
//!
//! These strategies produce values that satisfy the validation rules, so
//! generated documents can be applied to an engine without rejection.

use opscope::config::{CaptureMode, ConfigDocument, OperationConfig};
use proptest::collection::hash_map;
use proptest::option;
use proptest::prelude::*;

/// Generate a capture mode.
pub fn capture_mode_strategy() -> impl Strategy<Value = CaptureMode> {
    prop_oneof![
        Just(CaptureMode::Off),
        Just(CaptureMode::Redacted),
        Just(CaptureMode::Full),
    ]
}

/// Generate a dotted type key such as `payments.checkout.CartService`.
pub fn type_key_strategy() -> impl Strategy<Value = String> {
    ("[a-z]{3,8}", "[a-z]{3,8}", "[A-Z][a-zA-Z]{2,12}")
        .prop_map(|(a, b, ty)| format!("{a}.{b}.{ty}"))
}

/// Generate a method name.
pub fn method_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-zA-Z]{2,15}".prop_map(String::from)
}

/// Generate a namespace pattern, either exact or a `prefix.*` wildcard.
pub fn namespace_pattern_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        ("[a-z]{3,8}", "[a-z]{3,8}").prop_map(|(a, b)| format!("{a}.{b}")),
        "[a-z]{3,8}".prop_map(|a| format!("{a}.*")),
    ]
}

/// Generate a sampling rate within the accepted `[0.0, 1.0]` range.
pub fn sampling_rate_strategy() -> impl Strategy<Value = f64> {
    0.0f64..=1.0
}

/// Generate a valid partial operation config.
pub fn operation_config_strategy() -> impl Strategy<Value = OperationConfig> {
    (
        option::of(any::<bool>()),
        option::of(sampling_rate_strategy()),
        option::of(capture_mode_strategy()),
        option::of(any::<bool>()),
        option::of(1u64..60_000),
        option::of(hash_map("[a-z]{2,8}", "[a-z0-9]{1,12}", 0..4)),
    )
        .prop_map(
            |(enabled, sampling_rate, capture_mode, record_errors, slow_threshold_ms, tags)| {
                OperationConfig {
                    enabled,
                    sampling_rate,
                    capture_mode,
                    record_errors,
                    slow_threshold_ms,
                    tags,
                }
            },
        )
}

/// Generate a valid configuration document.
pub fn config_document_strategy() -> impl Strategy<Value = ConfigDocument> {
    (
        option::of(operation_config_strategy()),
        hash_map(namespace_pattern_strategy(), operation_config_strategy(), 0..4),
        hash_map(type_key_strategy(), operation_config_strategy(), 0..4),
        hash_map(
            (type_key_strategy(), method_name_strategy())
                .prop_map(|(t, m)| format!("{t}::{m}")),
            operation_config_strategy(),
            0..4,
        ),
    )
        .prop_map(|(global, namespaces, types, methods)| ConfigDocument {
            global,
            namespaces,
            types,
            methods,
            worker: None,
        })
}

//! Property-based tests for the configuration engine and rolling window.
//!
//! Tests validate:
//! - Field-wise merge semantics of partial configs
//! - Source precedence within a layer
//! - Namespace pattern resolution
//! - Effective-config range guarantees over arbitrary valid documents
//! - Rolling-window rate bounds

use opscope::config::{ConfigEngine, ConfigSource, OperationConfig, validate_document};
use opscope::window::RollingWindow;
use proptest::prelude::*;
use std::time::Duration;
use test_utils::generators::{
    config_document_strategy, operation_config_strategy, sampling_rate_strategy,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_merge_set_fields_win(
        base in operation_config_strategy(),
        over in operation_config_strategy(),
    ) {
        let merged = over.merged_over(&base);

        prop_assert_eq!(merged.enabled, over.enabled.or(base.enabled));
        prop_assert_eq!(merged.sampling_rate, over.sampling_rate.or(base.sampling_rate));
        prop_assert_eq!(merged.capture_mode, over.capture_mode.or(base.capture_mode));
        prop_assert_eq!(merged.record_errors, over.record_errors.or(base.record_errors));
        prop_assert_eq!(
            merged.slow_threshold_ms,
            over.slow_threshold_ms.or(base.slow_threshold_ms)
        );
    }

    #[test]
    fn prop_merge_over_empty_is_identity(config in operation_config_strategy()) {
        let merged = config.merged_over(&OperationConfig::default());
        prop_assert_eq!(merged, config);
    }

    #[test]
    fn prop_generated_documents_validate(doc in config_document_strategy()) {
        prop_assert!(validate_document(&doc).is_ok());
    }

    #[test]
    fn prop_effective_sampling_rate_in_range(
        doc in config_document_strategy(),
        rate in sampling_rate_strategy(),
    ) {
        let engine = ConfigEngine::new();
        engine.apply_document(&doc, ConfigSource::File).unwrap();
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(rate),
                ConfigSource::Runtime,
            )
            .unwrap();

        let effective = engine.effective(Some("payments.checkout.CartService"), Some("submit"), None);
        prop_assert!((0.0..=1.0).contains(&effective.sampling_rate));
    }

    #[test]
    fn prop_runtime_source_beats_file_and_code(
        code_rate in sampling_rate_strategy(),
        file_rate in sampling_rate_strategy(),
        runtime_rate in sampling_rate_strategy(),
    ) {
        let engine = ConfigEngine::new();
        // Write in an order that would lose under last-write-wins.
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(runtime_rate),
                ConfigSource::Runtime,
            )
            .unwrap();
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(file_rate),
                ConfigSource::File,
            )
            .unwrap();
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(code_rate),
                ConfigSource::Code,
            )
            .unwrap();

        let effective = engine.effective(None, None, None);
        prop_assert!((effective.sampling_rate - runtime_rate).abs() < f64::EPSILON);
    }

    #[test]
    fn prop_exact_namespace_beats_wildcard(
        prefix in "[a-z]{3,8}",
        segment in "[a-z]{3,8}",
        exact_rate in sampling_rate_strategy(),
        wildcard_rate in sampling_rate_strategy(),
    ) {
        prop_assume!((exact_rate - wildcard_rate).abs() > 0.01);

        let namespace = format!("{prefix}.{segment}");
        let engine = ConfigEngine::new();
        engine
            .set_namespace(
                format!("{prefix}.*"),
                OperationConfig::new().with_sampling_rate(wildcard_rate),
                ConfigSource::Code,
            )
            .unwrap();
        engine
            .set_namespace(
                namespace.clone(),
                OperationConfig::new().with_sampling_rate(exact_rate),
                ConfigSource::Code,
            )
            .unwrap();

        let type_key = format!("{namespace}.OrderService");
        let effective = engine.effective(Some(&type_key), None, None);
        prop_assert!((effective.sampling_rate - exact_rate).abs() < f64::EPSILON);
    }

    #[test]
    fn prop_call_override_beats_every_layer(
        doc in config_document_strategy(),
        rate in sampling_rate_strategy(),
    ) {
        let engine = ConfigEngine::new();
        engine.apply_document(&doc, ConfigSource::File).unwrap();

        let over = OperationConfig::new().with_sampling_rate(rate);
        let effective = engine.effective(
            Some("payments.checkout.CartService"),
            Some("submit"),
            Some(&over),
        );
        prop_assert!((effective.sampling_rate - rate).abs() < f64::EPSILON);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_window_count_bounded_by_records(n in 0usize..200) {
        let window = RollingWindow::new(Duration::from_secs(60));
        for _ in 0..n {
            window.record();
        }
        prop_assert!(window.count() <= n);
        prop_assert!(window.rate() >= 0.0);
        // A one-minute window cannot have pruned samples recorded just now.
        prop_assert_eq!(window.count(), n);
    }

    #[test]
    fn prop_window_clear_resets(n in 1usize..100) {
        let window = RollingWindow::new(Duration::from_secs(60));
        for _ in 0..n {
            window.record();
        }
        window.clear();
        prop_assert_eq!(window.count(), 0);
        prop_assert!(window.rate().abs() < f64::EPSILON);
    }
}

//! Configuration resolution diagnostics.
//!
//! `explain` answers "why does this call site behave this way": it lists,
//! in application order, every layer that contributed to the effective
//! configuration, including the winning source at each level.

use serde::Serialize;

use crate::config::schema::{ConfigLevel, ConfigSource, OperationConfig};
use crate::config::store::ConfigEngine;

/// One layer that contributed to an effective configuration.
#[derive(Debug, Clone, Serialize)]
pub struct LayerContribution {
    /// Specificity level of the layer
    pub level: ConfigLevel,
    /// Matched identifier (namespace pattern, type key, method key)
    pub identifier: Option<String>,
    /// Winning source at this level
    pub source: ConfigSource,
    /// The sparse configuration that was merged in
    pub config: OperationConfig,
}

impl ConfigEngine {
    /// Contributing layers for a call site, in application order.
    ///
    /// The last entry is the most specific stored layer; ad-hoc call
    /// overrides are not stored and so never appear here.
    #[must_use]
    pub fn explain(&self, type_key: Option<&str>, method: Option<&str>) -> Vec<LayerContribution> {
        let store = self.load_store();
        Self::contributions(&store, type_key, method)
            .into_iter()
            .map(|c| LayerContribution {
                level: c.level,
                identifier: c.identifier.map(ToString::to_string),
                source: c.source,
                config: c.config.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_lists_layers_in_application_order() {
        let engine = ConfigEngine::new();
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(0.5),
                ConfigSource::Code,
            )
            .unwrap();
        engine
            .set_namespace(
                "app.orders.*",
                OperationConfig::new().with_enabled(true),
                ConfigSource::File,
            )
            .unwrap();
        engine
            .set_method(
                "app.orders.OrderService",
                "place",
                OperationConfig::new().with_sampling_rate(1.0),
                ConfigSource::Runtime,
            )
            .unwrap();

        let layers = engine.explain(Some("app.orders.OrderService"), Some("place"));
        let levels: Vec<ConfigLevel> = layers.iter().map(|l| l.level).collect();
        assert_eq!(
            levels,
            vec![
                ConfigLevel::Global,
                ConfigLevel::Namespace,
                ConfigLevel::Method
            ]
        );
        assert_eq!(layers[1].identifier.as_deref(), Some("app.orders.*"));
        assert_eq!(layers[2].source, ConfigSource::Runtime);
    }

    #[test]
    fn test_explain_matches_effective() {
        let engine = ConfigEngine::new();
        engine
            .set_global(
                OperationConfig::new().with_sampling_rate(0.5),
                ConfigSource::Code,
            )
            .unwrap();
        engine
            .set_type(
                "app.Widget",
                OperationConfig::new().with_sampling_rate(0.9),
                ConfigSource::Code,
            )
            .unwrap();

        let layers = engine.explain(Some("app.Widget"), None);
        let mut folded = OperationConfig::default();
        for layer in &layers {
            folded = layer.config.merged_over(&folded);
        }
        let effective = engine.effective(Some("app.Widget"), None, None);
        assert!(
            (effective.sampling_rate - folded.sampling_rate.unwrap()).abs() < f64::EPSILON
        );
    }
}

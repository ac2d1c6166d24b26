//! Layered configuration store and resolution.
//!
//! Resolution happens on every scope creation, the hottest path in the
//! system, so reads are lock-free: the whole store is an immutable value
//! behind an [`ArcSwap`]. Writes (runtime API calls, file reloads) are rare
//! and take a coarse mutex to clone-mutate-swap the store.
//!
//! Resolution order, each layer merged field-wise over the previous, most
//! specific last: Global → best-matching Namespace → Type → Method →
//! ad-hoc call-site override. Within a level, source precedence
//! (Runtime > File > Code) picks which entry wins before the level's result
//! is merged upward.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tracing::warn;

use crate::config::schema::{
    ConfigDocument, ConfigLevel, ConfigSource, EffectiveConfig, METHOD_KEY_SEPARATOR,
    OperationConfig, method_key,
};
use crate::config::validation::{validate_document, validate_operation_config};
use crate::error::TelemetryError;

/// One entry per source at a given level/identifier.
#[derive(Debug, Clone, Default)]
pub(crate) struct SourceSlots {
    code: Option<OperationConfig>,
    file: Option<OperationConfig>,
    runtime: Option<OperationConfig>,
}

impl SourceSlots {
    fn set(&mut self, source: ConfigSource, config: OperationConfig) {
        match source {
            ConfigSource::Code => self.code = Some(config),
            ConfigSource::File => self.file = Some(config),
            ConfigSource::Runtime => self.runtime = Some(config),
        }
    }

    fn clear(&mut self, source: ConfigSource) {
        match source {
            ConfigSource::Code => self.code = None,
            ConfigSource::File => self.file = None,
            ConfigSource::Runtime => self.runtime = None,
        }
    }

    fn is_empty(&self) -> bool {
        self.code.is_none() && self.file.is_none() && self.runtime.is_none()
    }

    /// Highest-precedence entry present at this level.
    pub(crate) fn winner(&self) -> Option<(ConfigSource, &OperationConfig)> {
        if let Some(config) = &self.runtime {
            return Some((ConfigSource::Runtime, config));
        }
        if let Some(config) = &self.file {
            return Some((ConfigSource::File, config));
        }
        self.code.as_ref().map(|config| (ConfigSource::Code, config))
    }
}

/// Immutable layered store snapshot.
#[derive(Debug, Clone, Default)]
pub(crate) struct Store {
    pub(crate) global: SourceSlots,
    pub(crate) namespaces: HashMap<String, SourceSlots>,
    pub(crate) types: HashMap<String, SourceSlots>,
    pub(crate) methods: HashMap<String, SourceSlots>,
}

impl Store {
    /// Best-matching namespace entry for a candidate namespace.
    ///
    /// An entry matches if it equals the candidate or is a wildcard prefix
    /// of it. An exact match always outranks any wildcard; among wildcards
    /// the longest literal prefix wins.
    pub(crate) fn resolve_namespace(&self, candidate: &str) -> Option<(&str, &SourceSlots)> {
        if let Some((key, slots)) = self.namespaces.get_key_value(candidate) {
            return Some((key.as_str(), slots));
        }

        let mut best: Option<(&str, &SourceSlots, usize)> = None;
        for (key, slots) in &self.namespaces {
            let Some(literal) = key.strip_suffix(".*") else {
                continue;
            };
            let matches =
                candidate == literal || candidate.starts_with(&format!("{literal}."));
            if !matches {
                continue;
            }
            if best.is_none_or(|(_, _, len)| literal.len() > len) {
                best = Some((key.as_str(), slots, literal.len()));
            }
        }
        best.map(|(key, slots, _)| (key, slots))
    }
}

/// One stored layer that contributed to an effective configuration.
#[derive(Debug, Clone)]
pub(crate) struct Contribution<'a> {
    pub(crate) level: ConfigLevel,
    pub(crate) identifier: Option<&'a str>,
    pub(crate) source: ConfigSource,
    pub(crate) config: &'a OperationConfig,
}

/// Layered configuration engine with lock-free reads.
pub struct ConfigEngine {
    store: ArcSwap<Store>,
    write_lock: Mutex<()>,
    generation: watch::Sender<u64>,
}

impl ConfigEngine {
    /// Create an empty engine.
    #[must_use]
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            store: ArcSwap::from_pointee(Store::default()),
            write_lock: Mutex::new(()),
            generation,
        }
    }

    /// Set the global layer for a source.
    ///
    /// # Errors
    ///
    /// Returns a validation error for out-of-range values.
    pub fn set_global(
        &self,
        config: OperationConfig,
        source: ConfigSource,
    ) -> Result<(), TelemetryError> {
        Self::check(&config, "global")?;
        self.mutate(|store| store.global.set(source, config));
        Ok(())
    }

    /// Set a namespace entry (exact or wildcard-suffixed pattern).
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error for an empty pattern, or a validation
    /// error for out-of-range values.
    pub fn set_namespace(
        &self,
        pattern: impl Into<String>,
        config: OperationConfig,
        source: ConfigSource,
    ) -> Result<(), TelemetryError> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(TelemetryError::invalid_input(
                "namespace pattern must not be empty",
            ));
        }
        Self::check(&config, &pattern)?;
        self.mutate(|store| {
            store
                .namespaces
                .entry(pattern)
                .or_default()
                .set(source, config);
        });
        Ok(())
    }

    /// Set a type entry.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error for an empty key, or a validation
    /// error for out-of-range values.
    pub fn set_type(
        &self,
        type_key: impl Into<String>,
        config: OperationConfig,
        source: ConfigSource,
    ) -> Result<(), TelemetryError> {
        let type_key = type_key.into();
        if type_key.is_empty() {
            return Err(TelemetryError::invalid_input("type key must not be empty"));
        }
        Self::check(&config, &type_key)?;
        self.mutate(|store| {
            store.types.entry(type_key).or_default().set(source, config);
        });
        Ok(())
    }

    /// Set a method entry for `"Type::method"`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-input error for empty keys, or a validation error
    /// for out-of-range values.
    pub fn set_method(
        &self,
        type_key: &str,
        method: &str,
        config: OperationConfig,
        source: ConfigSource,
    ) -> Result<(), TelemetryError> {
        if type_key.is_empty() || method.is_empty() {
            return Err(TelemetryError::invalid_input(
                "type key and method name must not be empty",
            ));
        }
        let key = method_key(type_key, method);
        Self::check(&config, &key)?;
        self.mutate(|store| {
            store.methods.entry(key).or_default().set(source, config);
        });
        Ok(())
    }

    /// Replace one source's entries across every level from a document.
    ///
    /// The document is validated first; an invalid one is rejected
    /// wholesale and nothing changes. Method keys without a `"::"`
    /// separator are skipped with a warning so one malformed key cannot
    /// abort the rest of the load.
    ///
    /// # Errors
    ///
    /// Returns a validation error listing every out-of-range value.
    pub fn apply_document(
        &self,
        doc: &ConfigDocument,
        source: ConfigSource,
    ) -> Result<(), TelemetryError> {
        validate_document(doc).map_err(TelemetryError::Validation)?;
        self.mutate(|store| {
            store.global.clear(source);
            for slots in store.namespaces.values_mut() {
                slots.clear(source);
            }
            for slots in store.types.values_mut() {
                slots.clear(source);
            }
            for slots in store.methods.values_mut() {
                slots.clear(source);
            }
            store.namespaces.retain(|_, slots| !slots.is_empty());
            store.types.retain(|_, slots| !slots.is_empty());
            store.methods.retain(|_, slots| !slots.is_empty());

            if let Some(global) = &doc.global {
                store.global.set(source, global.clone());
            }
            for (pattern, config) in &doc.namespaces {
                store
                    .namespaces
                    .entry(pattern.clone())
                    .or_default()
                    .set(source, config.clone());
            }
            for (key, config) in &doc.types {
                store
                    .types
                    .entry(key.clone())
                    .or_default()
                    .set(source, config.clone());
            }
            for (key, config) in &doc.methods {
                if !key.contains(METHOD_KEY_SEPARATOR) {
                    warn!(key = %key, "Skipping malformed method key in configuration document");
                    continue;
                }
                store
                    .methods
                    .entry(key.clone())
                    .or_default()
                    .set(source, config.clone());
            }
        });
        Ok(())
    }

    /// Resolve the effective configuration for a call site.
    ///
    /// The namespace candidate is derived from the type key: everything
    /// before the final dot-separated segment.
    #[must_use]
    pub fn effective(
        &self,
        type_key: Option<&str>,
        method: Option<&str>,
        call_override: Option<&OperationConfig>,
    ) -> EffectiveConfig {
        let store = self.store.load();
        let mut merged = OperationConfig::default();
        for contribution in Self::contributions(&store, type_key, method) {
            merged = contribution.config.merged_over(&merged);
        }
        if let Some(over) = call_override {
            merged = over.merged_over(&merged);
        }
        EffectiveConfig::from(merged)
    }

    /// Current change generation; bumped on every accepted write.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    pub(crate) fn load_store(&self) -> Arc<Store> {
        self.store.load_full()
    }

    /// Stored layers applicable to a call site, in application order.
    pub(crate) fn contributions<'a>(
        store: &'a Store,
        type_key: Option<&str>,
        method: Option<&str>,
    ) -> Vec<Contribution<'a>> {
        let mut layers = Vec::with_capacity(4);

        if let Some((source, config)) = store.global.winner() {
            layers.push(Contribution {
                level: ConfigLevel::Global,
                identifier: None,
                source,
                config,
            });
        }

        if let Some(type_key) = type_key {
            if let Some(candidate) = namespace_of(type_key) {
                if let Some((pattern, slots)) = store.resolve_namespace(candidate) {
                    if let Some((source, config)) = slots.winner() {
                        layers.push(Contribution {
                            level: ConfigLevel::Namespace,
                            identifier: Some(pattern),
                            source,
                            config,
                        });
                    }
                }
            }

            if let Some((key, slots)) = store.types.get_key_value(type_key) {
                if let Some((source, config)) = slots.winner() {
                    layers.push(Contribution {
                        level: ConfigLevel::Type,
                        identifier: Some(key.as_str()),
                        source,
                        config,
                    });
                }
            }

            if let Some(method) = method {
                let key = method_key(type_key, method);
                if let Some((key, slots)) = store.methods.get_key_value(&key) {
                    if let Some((source, config)) = slots.winner() {
                        layers.push(Contribution {
                            level: ConfigLevel::Method,
                            identifier: Some(key.as_str()),
                            source,
                            config,
                        });
                    }
                }
            }
        }

        layers
    }

    fn check(config: &OperationConfig, scope: &str) -> Result<(), TelemetryError> {
        let errors = validate_operation_config(scope, config);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(TelemetryError::Validation(errors))
        }
    }

    fn mutate(&self, f: impl FnOnce(&mut Store)) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = Store::clone(&self.store.load());
        f(&mut next);
        self.store.store(Arc::new(next));
        self.generation.send_modify(|g| *g += 1);
    }
}

impl Default for ConfigEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Namespace portion of a dotted type key, if any.
fn namespace_of(type_key: &str) -> Option<&str> {
    type_key.rsplit_once('.').map(|(ns, _)| ns)
}

//! Configuration schema definitions.
//!
//! All types derive Serde traits so the same shapes serve the JSON
//! configuration document, the runtime API, and the HTTP endpoint.
//! `OperationConfig` is deliberately sparse: every field is optional, and
//! "unset" means "inherit from a less specific layer", never "use a
//! hardcoded default".

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Parameter-capture mode for instrumented operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    /// Capture nothing
    Off,
    /// Capture parameter names only, values redacted
    Redacted,
    /// Capture names and values
    Full,
}

/// Specificity level of a configuration entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    /// Applies to every operation
    Global,
    /// Applies to a namespace (exact or wildcard-suffixed pattern)
    Namespace,
    /// Applies to one registered type key
    Type,
    /// Applies to one `"Type::method"` key
    Method,
}

/// Origin of a configuration entry.
///
/// Within a level, `Runtime` beats `File` beats `Code` regardless of write
/// order; the derived `Ord` encodes that precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Set programmatically at startup
    Code,
    /// Loaded from the configuration file
    File,
    /// Set through the runtime API or HTTP endpoint
    Runtime,
}

/// Sparse per-operation configuration record.
///
/// Merging is field-wise: a more specific layer's *set* fields override the
/// broader layer's, unset fields fall through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationConfig {
    /// Whether instrumentation is enabled at all
    pub enabled: Option<bool>,
    /// Probability in [0, 1] that a scope emits a trace span
    pub sampling_rate: Option<f64>,
    /// Parameter-capture mode
    pub capture_mode: Option<CaptureMode>,
    /// Whether captured errors feed the error-rate window
    pub record_errors: Option<bool>,
    /// Elapsed-time threshold (milliseconds) for slow-operation tagging
    pub slow_threshold_ms: Option<u64>,
    /// Static tags stamped on every scope this layer applies to
    pub tags: Option<HashMap<String, String>>,
}

impl OperationConfig {
    /// Create an empty (fully inheriting) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the enabled flag.
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Set the sampling rate.
    #[must_use]
    pub const fn with_sampling_rate(mut self, rate: f64) -> Self {
        self.sampling_rate = Some(rate);
        self
    }

    /// Set the capture mode.
    #[must_use]
    pub const fn with_capture_mode(mut self, mode: CaptureMode) -> Self {
        self.capture_mode = Some(mode);
        self
    }

    /// Set the error-recording flag.
    #[must_use]
    pub const fn with_record_errors(mut self, record: bool) -> Self {
        self.record_errors = Some(record);
        self
    }

    /// Set the slow-operation threshold.
    #[must_use]
    pub const fn with_slow_threshold_ms(mut self, millis: u64) -> Self {
        self.slow_threshold_ms = Some(millis);
        self
    }

    /// Add a static tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Field-wise merge: `self`'s set fields win over `base`'s.
    #[must_use]
    pub fn merged_over(&self, base: &Self) -> Self {
        Self {
            enabled: self.enabled.or(base.enabled),
            sampling_rate: self.sampling_rate.or(base.sampling_rate),
            capture_mode: self.capture_mode.or(base.capture_mode),
            record_errors: self.record_errors.or(base.record_errors),
            slow_threshold_ms: self.slow_threshold_ms.or(base.slow_threshold_ms),
            tags: self.tags.clone().or_else(|| base.tags.clone()),
        }
    }

    /// True when every field is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Fully resolved configuration for one call site.
///
/// Produced by the engine after the merge chain; fields still unset at the
/// broadest layer take these final defaults: enabled, sample everything,
/// capture nothing, record errors, no slow threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    /// Whether instrumentation is enabled
    pub enabled: bool,
    /// Trace-span sampling probability in [0, 1]
    pub sampling_rate: f64,
    /// Parameter-capture mode
    pub capture_mode: CaptureMode,
    /// Whether captured errors feed the error-rate window
    pub record_errors: bool,
    /// Slow-operation threshold, if any
    pub slow_threshold_ms: Option<u64>,
    /// Merged static tags
    pub tags: HashMap<String, String>,
}

impl From<OperationConfig> for EffectiveConfig {
    fn from(sparse: OperationConfig) -> Self {
        Self {
            enabled: sparse.enabled.unwrap_or(true),
            sampling_rate: sparse.sampling_rate.unwrap_or(1.0),
            capture_mode: sparse.capture_mode.unwrap_or(CaptureMode::Off),
            record_errors: sparse.record_errors.unwrap_or(true),
            slow_threshold_ms: sparse.slow_threshold_ms,
            tags: sparse.tags.unwrap_or_default(),
        }
    }
}

/// Worker options carried by the configuration document.
///
/// Validated on load but applied at construction time only; a live queue is
/// never resized by a reload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Bounded queue capacity
    pub queue_capacity: Option<usize>,
}

/// Hierarchical configuration document.
///
/// Shape: `{ global, namespaces: {pattern: config}, types: {key: config},
/// methods: {"Type::method": config}, worker }`. Method keys missing the
/// `"::"` separator are skipped with a warning, never fatal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigDocument {
    /// Global layer
    pub global: Option<OperationConfig>,
    /// Namespace layer, keyed by exact or wildcard-suffixed pattern
    pub namespaces: HashMap<String, OperationConfig>,
    /// Type layer, keyed by registered type key
    pub types: HashMap<String, OperationConfig>,
    /// Method layer, keyed by `"Type::method"`
    pub methods: HashMap<String, OperationConfig>,
    /// Worker options
    pub worker: Option<WorkerOptions>,
}

/// Separator between type and method in a method key.
pub const METHOD_KEY_SEPARATOR: &str = "::";

/// Build a method key from its parts.
#[must_use]
pub fn method_key(type_key: &str, method: &str) -> String {
    format!("{type_key}{METHOD_KEY_SEPARATOR}{method}")
}

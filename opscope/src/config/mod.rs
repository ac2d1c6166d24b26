//! Multi-level configuration subsystem.
//!
//! # Data Flow
//! ```text
//! code defaults ──► ConfigEngine (Source::Code)
//! config file  ──► file.rs (parse) ──► validation.rs ──► Source::File
//! runtime API  ──► ConfigEngine (Source::Runtime)
//!
//! On file change:
//!     reloader.rs debounces ──► load + validate (bounded retries)
//!         valid   ──► atomic swap + change notification
//!         invalid ──► previous configuration stays live, no notification
//!
//! Per scope creation (hot path, lock-free):
//!     effective(type, method, override)
//!         = Global ⊕ Namespace ⊕ Type ⊕ Method ⊕ override   (field-wise)
//! ```
//!
//! # Design Decisions
//! - Reads never lock: the store is an immutable snapshot behind `ArcSwap`.
//! - Within a level the highest-precedence source entry wins wholesale
//!   (Runtime > File > Code); merging across levels is field-wise.
//! - Validation is pure and runs before acceptance, so an invalid reload
//!   can never corrupt live configuration.

pub mod diagnostics;
pub mod file;
pub mod reloader;
pub mod schema;
pub mod store;
pub mod validation;

pub use diagnostics::LayerContribution;
pub use file::load_document;
pub use reloader::{FileReloader, ReloaderConfig, ReloaderHandle};
pub use schema::{
    CaptureMode, ConfigDocument, ConfigLevel, ConfigSource, EffectiveConfig, OperationConfig,
    WorkerOptions, method_key,
};
pub use store::ConfigEngine;
pub use validation::{QUEUE_CAPACITY_FLOOR, ValidationError, validate_document};

//! Shared test utilities for the opscope workspace.
//!
//! This crate provides:
//! - Proptest generators for configuration domain types
//! - Test fixtures with sample configuration documents

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use generators::*;

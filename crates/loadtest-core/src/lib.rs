//! Shared building blocks for the load-test analyzer.
//!
//! Holds the canonical data model, the error type, the diagnostics sink that
//! every stage reports through, CLI/config settings and the small numeric
//! helpers (unit conversion, statistics, timestamps, formatting) used by the
//! data and rendering crates.

pub mod diagnostics;
pub mod error;
pub mod formatting;
pub mod models;
pub mod settings;
pub mod stats;
pub mod time_utils;
pub mod units;

pub use error::{PipelineError, Result};

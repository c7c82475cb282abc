//! Data layer for the load-test analyzer.
//!
//! Loads the raw point stream and snapshot tables of a run, normalizes the
//! tables into the canonical schema and aggregates everything into the series
//! the rendering crate draws.

pub mod aggregator;
pub mod normalizer;
pub mod reader;

pub use loadtest_core as core;

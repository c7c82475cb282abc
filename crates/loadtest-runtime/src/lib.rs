//! Orchestration layer for the load-test analyzer.
//!
//! Wires the data and rendering crates into one sequential pipeline that
//! turns a run directory into charts and an HTML report.

pub mod pipeline;

pub use loadtest_core as core;
pub use loadtest_data as data;
pub use loadtest_render as render;
pub use pipeline::{AnalysisPipeline, PipelineOptions, PipelineReport, RunPaths};

//! Rendering layer for the load-test analyzer.
//!
//! Draws line charts as SVG, rasterizes them to PNG and assembles the HTML
//! report of a run.

pub mod chart;
pub mod plots;
pub mod raster;
pub mod report;
pub mod theme;

pub use plots::{PlotOptions, PlotRenderer, PlotSummary};
pub use report::{ReportGenerator, ReportOptions};

//! Sequential analysis pipeline.
//!
//! Runs loader → normalizer → aggregator → plots → report for one run
//! directory. Every stage hands back a [`StageOutcome`]; the pipeline matches
//! it, records the status and passes `Option<T>` downstream, so a failing
//! source only removes its own charts and report sections.

use std::path::{Path, PathBuf};

use loadtest_core::diagnostics::{Diagnostics, Stage};
use loadtest_core::error::Result;
use loadtest_core::models::{RawTable, RunData, StageOutcome};
use loadtest_data::aggregator::{
    aggregate_points, aggregate_resources, order_scaling, DEFAULT_BUCKET_SECONDS,
};
use loadtest_data::normalizer::{normalize_resources, normalize_scaling, scaling_columns};
use loadtest_data::reader::SourceLoader;
use loadtest_render::plots::{has_scaling_charts, PlotOptions, PlotRenderer, PlotSummary};
use loadtest_render::report::{ReportGenerator, ReportOptions, PLOTS_DIR};

// ── Public types ──────────────────────────────────────────────────────────────

/// Input locations of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPaths {
    /// Holds the point stream; receives `plots/` and `report.html`.
    pub results_dir: PathBuf,
    /// Holds the pod and autoscaler tables.
    pub metrics_dir: PathBuf,
}

impl RunPaths {
    pub fn new(results_dir: impl Into<PathBuf>, metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            metrics_dir: metrics_dir.into(),
        }
    }

    pub fn plots_dir(&self) -> PathBuf {
        self.results_dir.join(PLOTS_DIR)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub bucket_seconds: u32,
    pub plots: PlotOptions,
    pub report: ReportOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            bucket_seconds: DEFAULT_BUCKET_SECONDS,
            plots: PlotOptions::default(),
            report: ReportOptions::default(),
        }
    }
}

/// Outcome of one stage, kept for the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageStatus {
    pub label: String,
    pub status: &'static str,
}

/// Result of a completed pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub report_path: PathBuf,
    pub plots: PlotSummary,
    /// Whether the direct-from-table autoscaler charts were attempted.
    pub scaling_fallback_used: bool,
    pub stages: Vec<StageStatus>,
}

impl PipelineReport {
    pub fn status_of(&self, label: &str) -> Option<&'static str> {
        self.stages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.status)
    }
}

// ── AnalysisPipeline ──────────────────────────────────────────────────────────

pub struct AnalysisPipeline {
    options: PipelineOptions,
}

impl AnalysisPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    /// Run every stage for `paths`.
    ///
    /// Only a failure to write the report escapes; every other problem is
    /// reported through `diag` and shrinks the report instead.
    pub fn run(&self, paths: &RunPaths, diag: &dyn Diagnostics) -> Result<PipelineReport> {
        let mut stages = Vec::new();
        let loader = SourceLoader::new(&paths.results_dir, &paths.metrics_dir);
        let sources = loader.load_all(diag);

        // Point stream → per-metric series
        let points = settle("point stream", sources.points, diag, &mut stages);
        let metrics = points.and_then(|points| {
            settle(
                "metric aggregation",
                StageOutcome::from(aggregate_points(&points)),
                diag,
                &mut stages,
            )
        });

        // Pod table → bucketed resource usage
        let pod_table = settle("pod metrics", sources.resources, diag, &mut stages);
        let snapshots = pod_table.and_then(|table| {
            settle(
                "pod normalization",
                normalize_resources(&table, diag),
                diag,
                &mut stages,
            )
        });
        let resources = snapshots.and_then(|snapshots| {
            settle(
                "resource aggregation",
                StageOutcome::from(aggregate_resources(&snapshots, self.options.bucket_seconds)),
                diag,
                &mut stages,
            )
        });

        // Autoscaler table → ordered snapshots; the raw table is kept for the fallback
        let scaling_table = settle("HPA metrics", sources.scaling, diag, &mut stages);
        let scaling = scaling_table
            .as_ref()
            .and_then(|table| {
                settle(
                    "HPA normalization",
                    normalize_scaling(table, diag),
                    diag,
                    &mut stages,
                )
            })
            .map(order_scaling);

        let data = RunData {
            metrics,
            resources,
            scaling,
        };

        let plots_dir = paths.plots_dir();
        let (plots, scaling_fallback_used) =
            self.render_plots(&plots_dir, &data, scaling_table.as_ref(), diag);

        let report_path = ReportGenerator::new(self.options.report.clone()).generate(
            &paths.results_dir,
            &data,
            diag,
        )?;

        Ok(PipelineReport {
            report_path,
            plots,
            scaling_fallback_used,
            stages,
        })
    }

    fn render_plots(
        &self,
        plots_dir: &Path,
        data: &RunData,
        scaling_table: Option<&RawTable>,
        diag: &dyn Diagnostics,
    ) -> (PlotSummary, bool) {
        if let Err(e) = std::fs::create_dir_all(plots_dir) {
            diag.error(
                Stage::Pipeline,
                &format!("Cannot create {}: {}", plots_dir.display(), e),
            );
        }

        let renderer = PlotRenderer::new(self.options.plots);
        let mut summary = renderer.render(plots_dir, data, diag);

        let needs_fallback = summary.scaling == 0 && !has_scaling_charts(plots_dir);
        let mut fallback_used = false;
        if let Some(table) = scaling_table.filter(|t| needs_fallback && !t.is_empty()) {
            diag.info(
                Stage::Pipeline,
                "No HPA charts from normalized data; drawing directly from the table",
            );
            let fallback =
                renderer.render_scaling_fallback(plots_dir, &scaling_columns(table, diag), diag);
            summary.total += fallback.total;
            summary.scaling += fallback.scaling;
            summary.failed += fallback.failed;
            summary.files.extend(fallback.files);
            fallback_used = true;
        }

        (summary, fallback_used)
    }
}

impl Default for AnalysisPipeline {
    fn default() -> Self {
        Self::new(PipelineOptions::default())
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Record the outcome of a stage and downgrade it to an `Option`.
fn settle<T>(
    label: &str,
    outcome: StageOutcome<T>,
    diag: &dyn Diagnostics,
    stages: &mut Vec<StageStatus>,
) -> Option<T> {
    stages.push(StageStatus {
        label: label.to_string(),
        status: outcome.status(),
    });
    match outcome {
        StageOutcome::Ready(value) => {
            diag.debug(Stage::Pipeline, &format!("{label}: ready"));
            Some(value)
        }
        StageOutcome::Absent => {
            diag.info(Stage::Pipeline, &format!("{label}: no data"));
            None
        }
        StageOutcome::Failed(e) => {
            diag.error(Stage::Pipeline, &format!("{label} failed: {e}"));
            None
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

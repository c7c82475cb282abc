//! HTML report generation.
//!
//! Builds the `report.html` of a run: header, chart gallery, statistics
//! tables and the closing checklist. The page is rendered through a `tera`
//! template with auto-escaping so metric and pod names cannot inject markup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use loadtest_core::diagnostics::{Diagnostics, Stage};
use loadtest_core::error::{PipelineError, Result};
use loadtest_core::formatting::{format_cores, format_megabytes, format_number, format_percent, title_from_stem};
use loadtest_core::models::{group_by_entity, MetricSeries, Normalized, ResourceBucket, RunData, ScalingSnapshot};
use loadtest_core::stats::{self, SummaryStats};
use loadtest_core::time_utils::format_in_timezone;
use serde::Serialize;
use tera::{Context, Tera};

pub const REPORT_FILE: &str = "report.html";
pub const PLOTS_DIR: &str = "plots";

/// Series whose name contains this marker get a request-metric table row.
const REQUEST_METRIC_MARKER: &str = "http_req";

const DEFAULT_MARK: &str = " (default)";

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{{ title }}</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 20px; color: #222; }
        h1, h2, h3 { color: #2c3e50; }
        .section { margin-bottom: 30px; }
        .plot { margin: 20px 0; }
        table { border-collapse: collapse; width: 100%; margin-bottom: 20px; }
        th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
        th { background-color: #f2f2f2; }
        tr:nth-child(even) { background-color: #f9f9f9; }
    </style>
</head>
<body>
    <h1>{{ title }}</h1>
    <p>Generated on {{ generated_on }}</p>

    <div class="section">
        <h2>Summary</h2>
        <p>This report summarizes the results of the load test run <code>{{ run_name }}</code>.</p>
    </div>

    <div class="section">
        <h2>Performance Metrics</h2>
{%- if gallery %}
{%- for image in gallery %}
        <div class="plot">
            <h3>{{ image.heading }}</h3>
            <img src="plots/{{ image.file }}" alt="{{ image.file }}" style="max-width: 100%;" />
        </div>
{%- endfor %}
{%- else %}
        <p>No charts were produced for this run.</p>
{%- endif %}
    </div>

    <div class="section">
        <h2>Statistics</h2>
{%- if request_rows %}
        <h3>HTTP Request Metrics</h3>
        <table>
            <tr><th>Metric</th><th>Min</th><th>Avg</th><th>Max</th><th>p90</th><th>p95</th></tr>
{%- for row in request_rows %}
            <tr><td>{{ row.metric }}</td><td>{{ row.min }}</td><td>{{ row.mean }}</td><td>{{ row.max }}</td><td>{{ row.p90 }}</td><td>{{ row.p95 }}</td></tr>
{%- endfor %}
        </table>
{%- endif %}
{%- if resource_rows %}
        <h3>Pod Resource Usage</h3>
        <table>
            <tr><th>Pod</th><th>Avg CPU</th><th>Max CPU</th><th>Avg Memory</th><th>Max Memory</th></tr>
{%- for row in resource_rows %}
            <tr><td>{{ row.entity }}</td><td>{{ row.mean_cpu }}</td><td>{{ row.max_cpu }}</td><td>{{ row.mean_memory }}</td><td>{{ row.max_memory }}</td></tr>
{%- endfor %}
        </table>
{%- endif %}
{%- if scaling %}
        <h3>Autoscaler</h3>
        <table>
            <tr><th>Observations</th><th>Min Current Replicas</th><th>Max Current Replicas</th><th>Max Desired Replicas</th><th>Avg CPU Utilization</th><th>Target CPU Utilization</th></tr>
            <tr><td>{{ scaling.observations }}</td><td>{{ scaling.min_current }}</td><td>{{ scaling.max_current }}</td><td>{{ scaling.max_desired }}</td><td>{{ scaling.mean_cpu }}</td><td>{{ scaling.target_cpu }}</td></tr>
        </table>
{%- endif %}
    </div>

    <div class="section">
        <h2>Conclusions</h2>
        <p>Based on the load test results, here are the key findings:</p>
        <ul>
            <li>The application's performance under load was tested with gradually increasing traffic.</li>
            <li>Check if the autoscaling performed as expected by examining the HPA metrics.</li>
            <li>Examine the latency metrics to identify potential bottlenecks.</li>
            <li>Look for any error rates or failed requests that may indicate issues under load.</li>
        </ul>
        <p>For detailed analysis, examine the individual metrics and logs in the results directory.</p>
    </div>
</body>
</html>
"#;

// ── Template rows ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryImage {
    pub file: String,
    pub heading: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestRow {
    pub metric: String,
    pub min: String,
    pub mean: String,
    pub max: String,
    pub p90: String,
    pub p95: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceRow {
    pub entity: String,
    pub mean_cpu: String,
    pub max_cpu: String,
    pub mean_memory: String,
    pub max_memory: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingSummary {
    pub observations: usize,
    pub min_current: String,
    pub max_current: String,
    pub max_desired: String,
    pub mean_cpu: String,
    pub target_cpu: String,
}

// ── ReportGenerator ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub title: String,
    /// Zone the "Generated on" header is shown in.
    pub timezone: Tz,
    pub generated_at: DateTime<Utc>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: "Load Test Report".to_string(),
            timezone: Tz::UTC,
            generated_at: Utc::now(),
        }
    }
}

pub struct ReportGenerator {
    options: ReportOptions,
}

impl ReportGenerator {
    pub fn new(options: ReportOptions) -> Self {
        Self { options }
    }

    /// Write `<run_dir>/report.html` and return its path.
    ///
    /// Missing upstream data only removes sections; the only failures are a
    /// broken template and an unwritable run directory.
    pub fn generate(&self, run_dir: &Path, data: &RunData, diag: &dyn Diagnostics) -> Result<PathBuf> {
        let html = self.render_html(run_dir, data, diag)?;
        let path = run_dir.join(REPORT_FILE);
        std::fs::write(&path, html)?;
        diag.info(Stage::Report, &format!("Report written to {}", path.display()));
        Ok(path)
    }

    pub fn render_html(&self, run_dir: &Path, data: &RunData, diag: &dyn Diagnostics) -> Result<String> {
        let gallery = collect_gallery(&run_dir.join(PLOTS_DIR));
        diag.debug(Stage::Report, &format!("Gallery holds {} charts", gallery.len()));

        let run_name = run_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| run_dir.display().to_string());

        let mut context = Context::new();
        context.insert("title", &self.options.title);
        context.insert(
            "generated_on",
            &format_in_timezone(self.options.generated_at, &self.options.timezone),
        );
        context.insert("run_name", &run_name);
        context.insert("gallery", &gallery);
        context.insert(
            "request_rows",
            &data.metrics.as_ref().map(request_rows).unwrap_or_default(),
        );
        context.insert(
            "resource_rows",
            &data
                .resources
                .as_deref()
                .map(resource_rows)
                .unwrap_or_default(),
        );
        context.insert("scaling", &data.scaling.as_deref().and_then(scaling_summary));

        Tera::one_off(REPORT_TEMPLATE, &context, true)
            .map_err(|e| PipelineError::Template(error_chain(&e)))
    }
}

// ── Section builders ──────────────────────────────────────────────────────────

/// PNG files directly under `plots_dir`, sorted by file name.
pub fn collect_gallery(plots_dir: &Path) -> Vec<GalleryImage> {
    walkdir::WalkDir::new(plots_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext == "png")
                    .unwrap_or(false)
        })
        .map(|entry| {
            let file = entry.file_name().to_string_lossy().into_owned();
            let stem = file.strip_suffix(".png").unwrap_or(&file);
            GalleryImage {
                heading: title_from_stem(stem),
                file: file.clone(),
            }
        })
        .collect()
}

/// One row per `http_req*` series, in metric-name order.
pub fn request_rows(metrics: &MetricSeries) -> Vec<RequestRow> {
    metrics
        .iter()
        .filter(|(name, _)| name.contains(REQUEST_METRIC_MARKER))
        .filter_map(|(name, series)| {
            let s = SummaryStats::from_values(&series.values())?;
            Some(RequestRow {
                metric: name.clone(),
                min: format_number(s.min, 2),
                mean: format_number(s.mean, 2),
                max: format_number(s.max, 2),
                p90: format_number(s.p90, 2),
                p95: format_number(s.p95, 2),
            })
        })
        .collect()
}

/// One row per pod, computed over that pod's bucket means.
pub fn resource_rows(buckets: &[ResourceBucket]) -> Vec<ResourceRow> {
    group_by_entity(buckets)
        .into_iter()
        .filter_map(|(entity, buckets)| {
            let cpu: Vec<f64> = buckets.iter().map(|b| b.mean_cpu).collect();
            let memory: Vec<f64> = buckets.iter().map(|b| b.mean_memory).collect();
            Some(ResourceRow {
                entity: entity.to_string(),
                mean_cpu: format_cores(stats::mean(&cpu)?),
                max_cpu: format_cores(stats::max(&cpu)?),
                mean_memory: format_megabytes(stats::mean(&memory)?),
                max_memory: format_megabytes(stats::max(&memory)?),
            })
        })
        .collect()
}

/// Autoscaler overview; `None` when there are no observations.
pub fn scaling_summary(snapshots: &[ScalingSnapshot]) -> Option<ScalingSummary> {
    let first = snapshots.first()?;

    // Only observed cells count; with none left the default is shown marked.
    let replicas = |pick: fn(&ScalingSnapshot) -> Normalized<u32>, take_max: bool| {
        let observed = snapshots
            .iter()
            .map(pick)
            .filter(|n| n.is_observed())
            .map(|n| n.value);
        let value = if take_max { observed.max() } else { observed.min() };
        match value {
            Some(v) => v.to_string(),
            None => mark(pick(first).value.to_string(), true),
        }
    };

    let observed_cpu: Vec<f64> = snapshots
        .iter()
        .filter(|s| s.current_cpu_pct.is_observed())
        .filter_map(|s| s.current_cpu_pct.value)
        .collect();
    let mean_cpu = stats::mean(&observed_cpu)
        .map(format_percent)
        .unwrap_or_else(|| "n/a".to_string());

    Some(ScalingSummary {
        observations: snapshots.len(),
        min_current: replicas(|s| s.current_replicas, false),
        max_current: replicas(|s| s.current_replicas, true),
        max_desired: replicas(|s| s.desired_replicas, true),
        mean_cpu,
        target_cpu: mark(
            format_percent(first.target_cpu_pct.value),
            !first.target_cpu_pct.is_observed(),
        ),
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn mark(value: String, defaulted: bool) -> String {
    if defaulted {
        value + DEFAULT_MARK
    } else {
        value
    }
}

/// Flatten a tera error and its causes into one line.
fn error_chain(err: &tera::Error) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

// ── Tests ──────────────────────────────────────────────────────────────────────

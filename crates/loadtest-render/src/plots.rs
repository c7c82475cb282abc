//! Chart production for a run.
//!
//! Turns the aggregated [`RunData`] into PNG files under `<run>/plots`:
//! one chart per duration/count metric, CPU and memory charts per pod, and
//! the autoscaler replica and CPU charts. A chart that fails to render is
//! reported and skipped; the others are still written.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use loadtest_core::diagnostics::{Diagnostics, Stage};
use loadtest_core::models::{group_by_entity, ResourceBucket, RunData, ScalingColumns, ScalingSnapshot};
use regex::Regex;

use crate::chart::{LineChart, Marker, Series};
use crate::raster::Rasterizer;
use crate::theme::ChartTheme;

pub const HPA_REPLICAS_FILE: &str = "hpa_replicas.png";
pub const HPA_CPU_FILE: &str = "hpa_cpu.png";

const TIME_LABEL: &str = "Time";

// ── Chart kinds and file names ────────────────────────────────────────────────

/// How a load-generator metric is plotted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Duration,
    Count,
}

impl MetricKind {
    /// Classify a metric by name; `None` for metrics that are not plotted.
    ///
    /// `"duration"` takes precedence over `"vus"` / `"reqs"`.
    pub fn for_metric(name: &str) -> Option<Self> {
        if name.contains("duration") {
            Some(MetricKind::Duration)
        } else if name.contains("vus") || name.contains("reqs") {
            Some(MetricKind::Count)
        } else {
            None
        }
    }

    pub fn y_label(&self) -> &'static str {
        match self {
            MetricKind::Duration => "Duration (ms)",
            MetricKind::Count => "Count",
        }
    }
}

/// Replace every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_file_component(raw: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    UNSAFE
        .get_or_init(|| Regex::new(r"[^A-Za-z0-9_-]").expect("regex is valid"))
        .replace_all(raw, "_")
        .into_owned()
}

pub fn metric_file_name(metric: &str) -> String {
    format!("k6_{}.png", sanitize_file_component(metric))
}

/// `(cpu, memory)` chart file names for a pod.
pub fn pod_file_names(entity: &str) -> (String, String) {
    let safe = sanitize_file_component(entity);
    (format!("pod_{safe}_cpu.png"), format!("pod_{safe}_memory.png"))
}

/// `true` when `plots_dir` already holds an `hpa_*.png` chart.
pub fn has_scaling_charts(plots_dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(plots_dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|entry| {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        name.starts_with("hpa_") && name.ends_with(".png")
    })
}

// ── PlotRenderer ──────────────────────────────────────────────────────────────

/// Pixel size of every chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotOptions {
    pub width: u32,
    pub height: u32,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
        }
    }
}

/// What a render pass produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlotSummary {
    /// Charts written, scaling charts included.
    pub total: usize,
    /// Autoscaler charts written.
    pub scaling: usize,
    /// Charts that could not be rendered.
    pub failed: usize,
    pub files: Vec<PathBuf>,
}

impl PlotSummary {
    fn merge(&mut self, other: PlotSummary) {
        self.total += other.total;
        self.scaling += other.scaling;
        self.failed += other.failed;
        self.files.extend(other.files);
    }
}

pub struct PlotRenderer {
    options: PlotOptions,
    theme: ChartTheme,
    rasterizer: Rasterizer,
}

impl PlotRenderer {
    pub fn new(options: PlotOptions) -> Self {
        Self {
            options,
            theme: ChartTheme::default(),
            rasterizer: Rasterizer::new(),
        }
    }

    /// Render every chart the run data supports into `plots_dir`.
    pub fn render(&self, plots_dir: &Path, data: &RunData, diag: &dyn Diagnostics) -> PlotSummary {
        let mut summary = PlotSummary::default();

        if let Some(metrics) = &data.metrics {
            for (name, series) in metrics {
                let Some(kind) = MetricKind::for_metric(name) else {
                    diag.debug(Stage::Plots, &format!("Not plotting metric {name}"));
                    continue;
                };
                let chart = LineChart::new(format!("K6 {name}"), TIME_LABEL, kind.y_label())
                    .with_series(Series::new(
                        name.as_str(),
                        series.points.iter().map(|p| (p.timestamp, p.value)).collect(),
                    ));
                self.emit(plots_dir, &metric_file_name(name), chart, false, &mut summary, diag);
            }
        }

        if let Some(resources) = &data.resources {
            for (entity, buckets) in group_by_entity(resources) {
                self.render_entity(plots_dir, entity, &buckets, &mut summary, diag);
            }
        }

        if let Some(scaling) = &data.scaling {
            summary.merge(self.render_scaling(plots_dir, scaling, diag));
        }

        diag.info(
            Stage::Plots,
            &format!(
                "Rendered {} charts ({} failed) in {}",
                summary.total,
                summary.failed,
                plots_dir.display()
            ),
        );
        summary
    }

    fn render_entity(
        &self,
        plots_dir: &Path,
        entity: &str,
        buckets: &[&ResourceBucket],
        summary: &mut PlotSummary,
        diag: &dyn Diagnostics,
    ) {
        let (cpu_file, memory_file) = pod_file_names(entity);

        let cpu = LineChart::new(format!("Pod {entity} - CPU Usage"), TIME_LABEL, "CPU (cores)")
            .with_series(Series::new(
                "CPU",
                buckets.iter().map(|b| (b.bucket_start, b.mean_cpu)).collect(),
            ));
        self.emit(plots_dir, &cpu_file, cpu, false, summary, diag);

        let memory =
            LineChart::new(format!("Pod {entity} - Memory Usage"), TIME_LABEL, "Memory (MB)")
                .with_series(Series::new(
                    "Memory",
                    buckets
                        .iter()
                        .map(|b| (b.bucket_start, b.mean_memory))
                        .collect(),
                ));
        self.emit(plots_dir, &memory_file, memory, false, summary, diag);
    }

    /// Replica chart when both replica columns came from the source table;
    /// CPU chart when at least one current CPU value was observed.
    fn render_scaling(
        &self,
        plots_dir: &Path,
        scaling: &[ScalingSnapshot],
        diag: &dyn Diagnostics,
    ) -> PlotSummary {
        let mut summary = PlotSummary::default();
        if scaling.is_empty() {
            return summary;
        }

        let replicas_located = scaling
            .iter()
            .all(|s| !s.current_replicas.is_default() && !s.desired_replicas.is_default());
        if replicas_located {
            let current: Vec<(DateTime<Utc>, f64)> = scaling
                .iter()
                .filter(|s| s.current_replicas.is_observed())
                .map(|s| (s.timestamp, f64::from(s.current_replicas.value)))
                .collect();
            let desired: Vec<(DateTime<Utc>, f64)> = scaling
                .iter()
                .filter(|s| s.desired_replicas.is_observed())
                .map(|s| (s.timestamp, f64::from(s.desired_replicas.value)))
                .collect();
            self.emit_replicas(plots_dir, current, desired, &mut summary, diag);
        } else {
            diag.info(
                Stage::Plots,
                "Skipping replica chart: replica columns not present in HPA metrics",
            );
        }

        let current_cpu: Vec<(DateTime<Utc>, f64)> = scaling
            .iter()
            .filter(|s| s.current_cpu_pct.is_observed())
            .filter_map(|s| s.current_cpu_pct.value.map(|v| (s.timestamp, v)))
            .collect();
        if current_cpu.is_empty() {
            diag.info(
                Stage::Plots,
                "Skipping HPA CPU chart: no observed CPU utilization",
            );
        } else {
            let target = scaling[0].target_cpu_pct.value;
            self.emit_cpu(plots_dir, current_cpu, Some(target), &mut summary, diag);
        }

        summary
    }

    /// Draw the autoscaler charts straight from exact-name table columns.
    pub fn render_scaling_fallback(
        &self,
        plots_dir: &Path,
        columns: &ScalingColumns,
        diag: &dyn Diagnostics,
    ) -> PlotSummary {
        let mut summary = PlotSummary::default();
        let paired = |values: &[Option<f64>]| -> Vec<(DateTime<Utc>, f64)> {
            columns
                .timestamps
                .iter()
                .zip(values)
                .filter_map(|(ts, v)| v.map(|v| (*ts, v)))
                .collect()
        };

        if let (Some(current), Some(desired)) =
            (&columns.current_replicas, &columns.desired_replicas)
        {
            self.emit_replicas(
                plots_dir,
                paired(current.as_slice()),
                paired(desired.as_slice()),
                &mut summary,
                diag,
            );
        }

        if let (Some(current), Some(target)) = (&columns.current_cpu_pct, &columns.target_cpu_pct) {
            let current = paired(current.as_slice());
            if !current.is_empty() {
                let target = target.iter().flatten().next().copied();
                self.emit_cpu(plots_dir, current, target, &mut summary, diag);
            }
        }

        diag.info(
            Stage::Plots,
            &format!("Fallback rendered {} HPA charts", summary.scaling),
        );
        summary
    }

    fn emit_replicas(
        &self,
        plots_dir: &Path,
        current: Vec<(DateTime<Utc>, f64)>,
        desired: Vec<(DateTime<Utc>, f64)>,
        summary: &mut PlotSummary,
        diag: &dyn Diagnostics,
    ) {
        if current.is_empty() && desired.is_empty() {
            return;
        }
        let chart = LineChart::new("HPA Replica Count", TIME_LABEL, "Replicas")
            .with_series(Series::new("Current Replicas", current).with_marker(Marker::Circle))
            .with_series(Series::new("Desired Replicas", desired).with_marker(Marker::Cross));
        self.emit(plots_dir, HPA_REPLICAS_FILE, chart, true, summary, diag);
    }

    fn emit_cpu(
        &self,
        plots_dir: &Path,
        current: Vec<(DateTime<Utc>, f64)>,
        target: Option<f64>,
        summary: &mut PlotSummary,
        diag: &dyn Diagnostics,
    ) {
        let mut chart = LineChart::new("HPA CPU Utilization", TIME_LABEL, "CPU Utilization %")
            .with_series(Series::new("Current CPU", current).with_marker(Marker::Circle));
        if let Some(target) = target {
            chart = chart.with_reference("Target CPU", target);
        }
        self.emit(plots_dir, HPA_CPU_FILE, chart, true, summary, diag);
    }

    /// Rasterize one chart into `plots_dir/file_name`, recording the outcome.
    ///
    /// Distinct names can sanitize to the same file; the first chart keeps it.
    fn emit(
        &self,
        plots_dir: &Path,
        file_name: &str,
        chart: LineChart,
        scaling: bool,
        summary: &mut PlotSummary,
        diag: &dyn Diagnostics,
    ) {
        if !chart.has_data() {
            diag.debug(Stage::Plots, &format!("Skipping empty chart {file_name}"));
            return;
        }
        let path = plots_dir.join(file_name);
        if summary.files.contains(&path) {
            diag.warn(
                Stage::Plots,
                &format!(
                    "Skipping chart {}: {file_name} was already written for another series",
                    chart.title
                ),
            );
            return;
        }
        let chart = chart.with_size(self.options.width, self.options.height);
        let svg = chart.to_svg(&self.theme);

        match self
            .rasterizer
            .write_png(&path, &svg, self.options.width, self.options.height)
        {
            Ok(()) => {
                diag.debug(Stage::Plots, &format!("Wrote {}", path.display()));
                summary.total += 1;
                if scaling {
                    summary.scaling += 1;
                }
                summary.files.push(path);
            }
            Err(e) => {
                diag.error(Stage::Plots, &e.to_string());
                summary.failed += 1;
            }
        }
    }
}

impl Default for PlotRenderer {
    fn default() -> Self {
        Self::new(PlotOptions::default())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use loadtest_core::diagnostics::{MemorySink, Severity};
    use loadtest_core::models::{MetricSeries, Normalized, SeriesPoint, TimeSeries};
    use tempfile::TempDir;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_709_251_200 + secs, 0).unwrap()
    }

    fn small_renderer() -> PlotRenderer {
        PlotRenderer::new(PlotOptions {
            width: 320,
            height: 200,
        })
    }

    fn series(name: &str, values: &[f64]) -> TimeSeries {
        TimeSeries {
            name: name.to_string(),
            points: values
                .iter()
                .enumerate()
                .map(|(i, v)| SeriesPoint {
                    timestamp: ts(i as i64 * 10),
                    value: *v,
                })
                .collect(),
        }
    }

    fn scaling_row(secs: i64, current: Normalized<u32>, cpu: Normalized<Option<f64>>) -> ScalingSnapshot {
        ScalingSnapshot {
            timestamp: ts(secs),
            min_replicas: Normalized::observed(1),
            max_replicas: Normalized::observed(10),
            current_replicas: current,
            desired_replicas: current,
            current_cpu_pct: cpu,
            target_cpu_pct: Normalized::observed(60.0),
        }
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    // ── naming ───────────────────────────────────────────────────────────────

    #[test]
    fn test_metric_kind() {
        assert_eq!(MetricKind::for_metric("http_req_duration"), Some(MetricKind::Duration));
        assert_eq!(MetricKind::for_metric("vus"), Some(MetricKind::Count));
        assert_eq!(MetricKind::for_metric("http_reqs"), Some(MetricKind::Count));
        assert_eq!(MetricKind::for_metric("vus_duration"), Some(MetricKind::Duration));
        assert_eq!(MetricKind::for_metric("data_received"), None);
    }

    #[test]
    fn test_sanitize_file_component() {
        assert_eq!(sanitize_file_component("api-7d9f_x"), "api-7d9f_x");
        assert_eq!(sanitize_file_component("a/b c.d"), "a_b_c_d");
        assert_eq!(metric_file_name("http_req_duration"), "k6_http_req_duration.png");
        assert_eq!(
            pod_file_names("api/1"),
            ("pod_api_1_cpu.png".to_string(), "pod_api_1_memory.png".to_string())
        );
    }

    #[test]
    fn test_has_scaling_charts() {
        let dir = TempDir::new().unwrap();
        assert!(!has_scaling_charts(dir.path()));
        std::fs::write(dir.path().join("hpa_cpu.png"), b"x").unwrap();
        assert!(has_scaling_charts(dir.path()));
        assert!(!has_scaling_charts(&dir.path().join("missing")));
    }

    // ── render ───────────────────────────────────────────────────────────────

    #[test]
    fn test_render_metrics_and_pods() {
        let dir = TempDir::new().unwrap();
        let mut metrics = MetricSeries::new();
        metrics.insert("http_req_duration".into(), series("http_req_duration", &[12.0, 30.0]));
        metrics.insert("vus".into(), series("vus", &[1.0, 5.0]));
        metrics.insert("iterations".into(), series("iterations", &[1.0]));
        let data = RunData {
            metrics: Some(metrics),
            resources: Some(vec![ResourceBucket {
                entity_name: "api-1".into(),
                bucket_start: ts(0),
                mean_cpu: 0.25,
                mean_memory: 128.0,
                samples: 1,
            }]),
            scaling: None,
        };

        let sink = MemorySink::new();
        let summary = small_renderer().render(dir.path(), &data, &sink);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.scaling, 0);
        assert_eq!(
            file_names(dir.path()),
            vec![
                "k6_http_req_duration.png",
                "k6_vus.png",
                "pod_api-1_cpu.png",
                "pod_api-1_memory.png"
            ]
        );
        assert_eq!(sink.count(Severity::Error), 0);
    }

    #[test]
    fn test_render_colliding_file_names_keep_first() {
        let dir = TempDir::new().unwrap();
        let mut metrics = MetricSeries::new();
        metrics.insert("vus.max".into(), series("vus.max", &[1.0, 2.0]));
        metrics.insert("vus_max".into(), series("vus_max", &[3.0, 4.0]));
        let data = RunData {
            metrics: Some(metrics),
            ..Default::default()
        };

        let sink = MemorySink::new();
        let summary = small_renderer().render(dir.path(), &data, &sink);

        assert_eq!(summary.total, 1);
        assert_eq!(summary.files, vec![dir.path().join("k6_vus_max.png")]);
        assert_eq!(file_names(dir.path()), vec!["k6_vus_max.png"]);
        assert_eq!(sink.count(Severity::Warning), 1);
        assert!(sink.contains("Skipping chart K6 vus_max"));
    }

    #[test]
    fn test_render_scaling_observed() {
        let dir = TempDir::new().unwrap();
        let data = RunData {
            scaling: Some(vec![
                scaling_row(0, Normalized::observed(2), Normalized::observed(Some(40.0))),
                scaling_row(30, Normalized::observed(3), Normalized::observed(Some(75.0))),
            ]),
            ..Default::default()
        };

        let summary = small_renderer().render(dir.path(), &data, &MemorySink::new());
        assert_eq!(summary.scaling, 2);
        assert_eq!(file_names(dir.path()), vec![HPA_CPU_FILE, HPA_REPLICAS_FILE]);
    }

    #[test]
    fn test_render_scaling_defaults_not_plotted() {
        let dir = TempDir::new().unwrap();
        let data = RunData {
            scaling: Some(vec![
                scaling_row(0, Normalized::defaulted(2), Normalized::defaulted(Some(30.0))),
                scaling_row(30, Normalized::defaulted(2), Normalized::defaulted(Some(30.0))),
            ]),
            ..Default::default()
        };

        let summary = small_renderer().render(dir.path(), &data, &MemorySink::new());
        assert_eq!(summary.total, 0);
        assert!(file_names(dir.path()).is_empty());
    }

    #[test]
    fn test_render_unwritable_dir_counts_failures() {
        let dir = TempDir::new().unwrap();
        let mut metrics = MetricSeries::new();
        metrics.insert("vus".into(), series("vus", &[1.0, 2.0]));
        let data = RunData {
            metrics: Some(metrics),
            ..Default::default()
        };

        let sink = MemorySink::new();
        let summary = small_renderer().render(&dir.path().join("missing"), &data, &sink);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.failed, 1);
        assert_eq!(sink.count(Severity::Error), 1);
    }

    // ── render_scaling_fallback ──────────────────────────────────────────────

    #[test]
    fn test_fallback_draws_from_exact_columns() {
        let dir = TempDir::new().unwrap();
        let columns = ScalingColumns {
            timestamps: vec![ts(0), ts(30)],
            current_replicas: Some(vec![Some(2.0), Some(3.0)]),
            desired_replicas: Some(vec![Some(3.0), None]),
            current_cpu_pct: Some(vec![Some(20.0), Some(65.0)]),
            target_cpu_pct: Some(vec![None, Some(50.0)]),
        };

        let summary = small_renderer().render_scaling_fallback(dir.path(), &columns, &MemorySink::new());
        assert_eq!(summary.scaling, 2);
        assert!(has_scaling_charts(dir.path()));
    }

    #[test]
    fn test_fallback_needs_both_columns() {
        let dir = TempDir::new().unwrap();
        let columns = ScalingColumns {
            timestamps: vec![ts(0)],
            current_replicas: Some(vec![Some(2.0)]),
            current_cpu_pct: Some(vec![Some(20.0)]),
            ..Default::default()
        };

        let summary = small_renderer().render_scaling_fallback(dir.path(), &columns, &MemorySink::new());
        assert_eq!(summary.total, 0);
    }

    #[test]
    fn test_render_is_pixel_identical_on_rerun() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        let mut metrics = MetricSeries::new();
        metrics.insert("vus".into(), series("vus", &[1.0, 4.0, 2.0]));
        let data = RunData {
            metrics: Some(metrics),
            ..Default::default()
        };

        let renderer = small_renderer();
        renderer.render(first.path(), &data, &MemorySink::new());
        renderer.render(second.path(), &data, &MemorySink::new());

        let a = std::fs::read(first.path().join("k6_vus.png")).unwrap();
        let b = std::fs::read(second.path().join("k6_vus.png")).unwrap();
        assert_eq!(a, b);
    }
}

//! Source loading for one load-test run.
//!
//! Reads the load generator's NDJSON point stream from the run directory and
//! the pod / autoscaler snapshot tables from the metrics directory. Every
//! source resolves independently to a [`StageOutcome`]: a missing file is
//! `Absent`, never an error.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use loadtest_core::diagnostics::{Diagnostics, Stage};
use loadtest_core::error::{PipelineError, Result};
use loadtest_core::models::{MeasurementPoint, RawTable, StageOutcome};
use loadtest_core::time_utils::parse_timestamp;
use serde::Deserialize;

/// File name of the point stream inside the run directory.
pub const POINT_STREAM_FILE: &str = "k6-results.json";

/// Record kind carried by measurement lines of the point stream.
const POINT_RECORD_KIND: &str = "Point";

// ── Source kinds ──────────────────────────────────────────────────────────────

/// The two header-based snapshot tables of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Resources,
    Scaling,
}

impl SourceKind {
    /// Candidate file names, in priority order.
    pub fn candidates(&self) -> &'static [&'static str] {
        match self {
            SourceKind::Resources => &["podmetrics.csv", "pod-metrics.csv"],
            SourceKind::Scaling => &["hpametrics.csv", "hpa-metrics.csv"],
        }
    }

    /// Name used in diagnostics.
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::Resources => "pod metrics",
            SourceKind::Scaling => "HPA metrics",
        }
    }
}

/// Raw record sets of a run, one outcome per logical source.
#[derive(Debug)]
pub struct RawSources {
    pub points: StageOutcome<Vec<MeasurementPoint>>,
    pub resources: StageOutcome<RawTable>,
    pub scaling: StageOutcome<RawTable>,
}

// ── Point stream wire format ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    metric: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct PointData {
    time: String,
    value: f64,
}

// ── SourceLoader ──────────────────────────────────────────────────────────────

/// Loads the raw inputs of one run directory.
#[derive(Debug, Clone)]
pub struct SourceLoader {
    results_dir: PathBuf,
    metrics_dir: PathBuf,
}

impl SourceLoader {
    pub fn new(results_dir: impl Into<PathBuf>, metrics_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
            metrics_dir: metrics_dir.into(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn metrics_dir(&self) -> &Path {
        &self.metrics_dir
    }

    pub fn point_stream_path(&self) -> PathBuf {
        self.results_dir.join(POINT_STREAM_FILE)
    }

    /// Create the metrics directory when it does not exist yet.
    pub fn ensure_metrics_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.metrics_dir).map_err(|source| PipelineError::FileRead {
            path: self.metrics_dir.clone(),
            source,
        })
    }

    /// Load every source. Never fails as a whole; each source carries its own
    /// outcome.
    pub fn load_all(&self, diag: &dyn Diagnostics) -> RawSources {
        if let Err(e) = self.ensure_metrics_dir() {
            diag.warn(Stage::Loader, &e.to_string());
        }

        RawSources {
            points: self.load_points(diag),
            resources: self.load_table(SourceKind::Resources, diag),
            scaling: self.load_table(SourceKind::Scaling, diag),
        }
    }

    /// Parse the point stream line by line.
    ///
    /// Lines that are not JSON, or whose `type` is not `"Point"`, are skipped
    /// silently. Point lines with an unreadable timestamp are dropped with a
    /// warning.
    pub fn load_points(&self, diag: &dyn Diagnostics) -> StageOutcome<Vec<MeasurementPoint>> {
        let path = self.point_stream_path();
        if !path.exists() {
            diag.warn(
                Stage::Loader,
                &format!("Point stream not found: {}", path.display()),
            );
            return StageOutcome::Absent;
        }

        let file = match std::fs::File::open(&path) {
            Ok(f) => f,
            Err(source) => return StageOutcome::Failed(PipelineError::FileRead { path, source }),
        };

        let reader = std::io::BufReader::new(file);
        let mut points = Vec::new();
        let mut skipped = 0u64;

        for line_result in reader.lines() {
            let line = match line_result {
                Ok(l) => l,
                Err(_) => continue,
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match parse_point_line(trimmed) {
                Some(Ok(point)) => points.push(point),
                Some(Err(raw_time)) => diag.warn(
                    Stage::Loader,
                    &PipelineError::TimestampParse(raw_time).to_string(),
                ),
                None => skipped += 1,
            }
        }

        diag.debug(
            Stage::Loader,
            &format!(
                "Loaded {} points from {} ({} other lines skipped)",
                points.len(),
                path.display(),
                skipped
            ),
        );
        StageOutcome::Ready(points)
    }

    /// Load the first candidate file of `kind` that parses.
    ///
    /// `Absent` when no candidate exists; `Failed` with the last parse error
    /// when candidates exist but none of them parse.
    pub fn load_table(&self, kind: SourceKind, diag: &dyn Diagnostics) -> StageOutcome<RawTable> {
        let mut last_error: Option<PipelineError> = None;

        for name in kind.candidates() {
            let path = self.metrics_dir.join(name);
            if !path.is_file() {
                continue;
            }
            match read_table(&path) {
                Ok(table) => {
                    diag.debug(
                        Stage::Loader,
                        &format!(
                            "Loaded {} rows of {} from {}",
                            table.len(),
                            kind.label(),
                            path.display()
                        ),
                    );
                    return StageOutcome::Ready(table);
                }
                Err(e) => {
                    diag.warn(Stage::Loader, &e.to_string());
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => StageOutcome::Failed(e),
            None => {
                diag.warn(
                    Stage::Loader,
                    &format!(
                        "No {} file found in {} (tried {})",
                        kind.label(),
                        self.metrics_dir.display(),
                        kind.candidates().join(", ")
                    ),
                );
                StageOutcome::Absent
            }
        }
    }
}

// ── Table parsing ─────────────────────────────────────────────────────────────

/// Read a header-based CSV table. Short and long rows are kept as-is.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let file = std::fs::File::open(path).map_err(|source| PipelineError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |e: csv::Error| PipelineError::MalformedTable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(malformed)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(RawTable {
        source: path.to_path_buf(),
        headers,
        rows,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// `None` for lines that are not measurement points; `Some(Err(time))` for
/// point lines whose timestamp cannot be parsed.
fn parse_point_line(line: &str) -> Option<std::result::Result<MeasurementPoint, String>> {
    let record: StreamRecord = serde_json::from_str(line).ok()?;
    if record.kind != POINT_RECORD_KIND {
        return None;
    }
    let metric_name = record.metric?;
    let data: PointData = serde_json::from_value(record.data?).ok()?;

    Some(match parse_timestamp(&data.time) {
        Some(timestamp) => Ok(MeasurementPoint {
            metric_name,
            timestamp,
            value: data.value,
        }),
        None => Err(data.time),
    })
}

// ── Tests ──────────────────────────────────────────────────────────────────────

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::PipelineError;

/// One measurement emitted by the load generator's point stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPoint {
    /// Metric name, e.g. `"http_req_duration"` or `"vus"`.
    pub metric_name: String,
    /// UTC instant of the measurement.
    pub timestamp: DateTime<Utc>,
    /// Raw measured value.
    pub value: f64,
}

/// One CPU/memory reading for one entity (pod) at one collection tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Entity (pod) name.
    pub entity_name: String,
    /// UTC instant of the reading.
    pub timestamp: DateTime<Utc>,
    /// CPU usage in whole cores, always `>= 0`.
    pub cpu_cores: f64,
    /// Memory usage in megabytes, always `>= 0`.
    pub memory_megabytes: f64,
}

/// Where a normalized field value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSource {
    /// Read from a source column and parsed successfully.
    Observed,
    /// No accepted alias was present in the table; the documented default
    /// was synthesized.
    Defaulted,
    /// The column existed but this cell was not numeric.
    Unparsable,
}

/// A canonical field value tagged with its [`FieldSource`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalized<T> {
    pub value: T,
    pub source: FieldSource,
}

impl<T> Normalized<T> {
    pub fn observed(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Observed,
        }
    }

    pub fn defaulted(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Defaulted,
        }
    }

    pub fn unparsable(value: T) -> Self {
        Self {
            value,
            source: FieldSource::Unparsable,
        }
    }

    /// `true` when the value is a synthesized default rather than data.
    pub fn is_default(&self) -> bool {
        self.source == FieldSource::Defaulted
    }

    pub fn is_observed(&self) -> bool {
        self.source == FieldSource::Observed
    }
}

/// One autoscaler observation in the canonical schema.
///
/// Every field is populated; [`Normalized::source`] tells observed data apart
/// from synthesized defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingSnapshot {
    pub timestamp: DateTime<Utc>,
    pub min_replicas: Normalized<u32>,
    pub max_replicas: Normalized<u32>,
    pub current_replicas: Normalized<u32>,
    pub desired_replicas: Normalized<u32>,
    /// `None` when the source cell was present but not numeric.
    pub current_cpu_pct: Normalized<Option<f64>>,
    pub target_cpu_pct: Normalized<f64>,
}

/// A single `(timestamp, value)` pair of a [`TimeSeries`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// A named series ordered ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Values in timestamp order.
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// `true` when timestamps never decrease.
    pub fn is_time_ordered(&self) -> bool {
        self.points
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp)
    }
}

/// Mean resource usage of one entity within one fixed-width time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceBucket {
    pub entity_name: String,
    /// Inclusive start of the bucket (aligned to the bucket width).
    pub bucket_start: DateTime<Utc>,
    pub mean_cpu: f64,
    pub mean_memory: f64,
    /// Number of snapshots that fell into the bucket.
    pub samples: usize,
}

/// Group buckets by entity name, preserving bucket order within each entity.
pub fn group_by_entity(buckets: &[ResourceBucket]) -> BTreeMap<&str, Vec<&ResourceBucket>> {
    let mut grouped: BTreeMap<&str, Vec<&ResourceBucket>> = BTreeMap::new();
    for bucket in buckets {
        grouped
            .entry(bucket.entity_name.as_str())
            .or_default()
            .push(bucket);
    }
    grouped
}

/// A header-based table as read from disk, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// File the table was read from.
    pub source: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Index of the first header exactly equal to `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cell at `(row, column)`; `None` for short rows.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Scaling columns read by exact canonical name only, with no aliases and no
/// defaults. Used by the direct scaling chart fallback.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalingColumns {
    pub timestamps: Vec<DateTime<Utc>>,
    pub current_replicas: Option<Vec<Option<f64>>>,
    pub desired_replicas: Option<Vec<Option<f64>>>,
    pub current_cpu_pct: Option<Vec<Option<f64>>>,
    pub target_cpu_pct: Option<Vec<Option<f64>>>,
}

/// Per-metric time series keyed (and therefore sorted) by metric name.
pub type MetricSeries = BTreeMap<String, TimeSeries>;

/// Everything the rendering stages consume. Each signal is `None` when its
/// upstream stage produced nothing.
#[derive(Debug, Clone, Default)]
pub struct RunData {
    pub metrics: Option<MetricSeries>,
    pub resources: Option<Vec<ResourceBucket>>,
    pub scaling: Option<Vec<ScalingSnapshot>>,
}

// ── StageOutcome ──────────────────────────────────────────────────────────────

/// Typed result of one pipeline stage.
#[derive(Debug)]
pub enum StageOutcome<T> {
    /// The stage produced a value.
    Ready(T),
    /// The stage had nothing to work on (missing file, empty table, ...).
    Absent,
    /// The stage failed; downstream stages treat the signal as absent.
    Failed(PipelineError),
}

impl<T> StageOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, StageOutcome::Ready(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, StageOutcome::Absent)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed(_))
    }

    /// Borrow the value, if any.
    pub fn as_ready(&self) -> Option<&T> {
        match self {
            StageOutcome::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// Discard the failure detail and keep only the value.
    pub fn ready(self) -> Option<T> {
        match self {
            StageOutcome::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// Feed a ready value into the next stage; absence and failure pass
    /// through unchanged.
    pub fn and_then<U>(self, f: impl FnOnce(T) -> StageOutcome<U>) -> StageOutcome<U> {
        match self {
            StageOutcome::Ready(v) => f(v),
            StageOutcome::Absent => StageOutcome::Absent,
            StageOutcome::Failed(e) => StageOutcome::Failed(e),
        }
    }

    /// Short status word used in logs.
    pub fn status(&self) -> &'static str {
        match self {
            StageOutcome::Ready(_) => "ready",
            StageOutcome::Absent => "absent",
            StageOutcome::Failed(_) => "failed",
        }
    }
}

impl<T> From<crate::error::Result<T>> for StageOutcome<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(v) => StageOutcome::Ready(v),
            Err(e) => StageOutcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_normalized_flags() {
        let observed = Normalized::observed(3u32);
        let defaulted = Normalized::defaulted(2u32);
        let broken = Normalized::unparsable(0u32);

        assert!(observed.is_observed());
        assert!(!observed.is_default());
        assert!(defaulted.is_default());
        assert!(!broken.is_default());
        assert!(!broken.is_observed());
    }

    #[test]
    fn test_observed_zero_differs_from_defaulted_zero() {
        assert_ne!(Normalized::observed(0u32), Normalized::defaulted(0u32));
    }

    #[test]
    fn test_time_series_ordering_check() {
        let sorted = TimeSeries {
            name: "vus".to_string(),
            points: vec![
                SeriesPoint { timestamp: ts(1), value: 1.0 },
                SeriesPoint { timestamp: ts(1), value: 2.0 },
                SeriesPoint { timestamp: ts(5), value: 3.0 },
            ],
        };
        assert!(sorted.is_time_ordered());
        assert_eq!(sorted.values(), vec![1.0, 2.0, 3.0]);

        let unsorted = TimeSeries {
            name: "vus".to_string(),
            points: vec![
                SeriesPoint { timestamp: ts(5), value: 1.0 },
                SeriesPoint { timestamp: ts(1), value: 2.0 },
            ],
        };
        assert!(!unsorted.is_time_ordered());
    }

    #[test]
    fn test_raw_table_lookup() {
        let table = RawTable {
            source: PathBuf::from("pod-metrics.csv"),
            headers: vec!["Name".to_string(), "CPU".to_string()],
            rows: vec![vec!["api-1".to_string(), "500m".to_string()], vec!["api-2".to_string()]],
        };
        assert_eq!(table.column_index("CPU"), Some(1));
        assert_eq!(table.column_index("cpu"), None);
        assert_eq!(table.cell(0, 1), Some("500m"));
        assert_eq!(table.cell(1, 1), None);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_stage_outcome_and_then() {
        let ready: StageOutcome<u32> = StageOutcome::Ready(2);
        let doubled = ready.and_then(|v| StageOutcome::Ready(v * 2));
        assert_eq!(doubled.ready(), Some(4));

        let absent: StageOutcome<u32> = StageOutcome::Absent;
        assert!(absent.and_then(|v| StageOutcome::Ready(v * 2)).is_absent());

        let failed: StageOutcome<u32> =
            StageOutcome::Failed(PipelineError::TimestampParse("x".to_string()));
        let next = failed.and_then(|v| StageOutcome::Ready(v * 2));
        assert!(next.is_failed());
        assert_eq!(next.status(), "failed");
    }

    #[test]
    fn test_stage_outcome_from_result() {
        let ok = StageOutcome::from(Ok::<u8, PipelineError>(1));
        assert!(ok.is_ready());
        let err = StageOutcome::from(Err::<u8, PipelineError>(PipelineError::Template(
            "bad".to_string(),
        )));
        assert!(err.is_failed());
    }
}

//! Grouping of normalized records into the series the renderers consume.
//!
//! Every output is sorted before any arithmetic happens, so results do not
//! depend on the order records arrived in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use loadtest_core::error::{PipelineError, Result};
use loadtest_core::models::{
    MeasurementPoint, MetricSeries, ResourceBucket, ResourceSnapshot, ScalingSnapshot, SeriesPoint,
    TimeSeries,
};
use loadtest_core::time_utils::bucket_start;

/// Default resource bucket width.
pub const DEFAULT_BUCKET_SECONDS: u32 = 30;

// ── Measurement points ────────────────────────────────────────────────────────

/// Group points by metric name into full, time-ordered series.
///
/// Fails with [`PipelineError::InvalidValue`] on a non-finite value.
pub fn aggregate_points(points: &[MeasurementPoint]) -> Result<MetricSeries> {
    let mut grouped: BTreeMap<&str, Vec<SeriesPoint>> = BTreeMap::new();

    for point in points {
        ensure_finite(&point.metric_name, point.value)?;
        grouped
            .entry(point.metric_name.as_str())
            .or_default()
            .push(SeriesPoint {
                timestamp: point.timestamp,
                value: point.value,
            });
    }

    Ok(grouped
        .into_iter()
        .map(|(name, mut points)| {
            points.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.value.total_cmp(&b.value))
            });
            (
                name.to_string(),
                TimeSeries {
                    name: name.to_string(),
                    points,
                },
            )
        })
        .collect())
}

// ── Resource snapshots ────────────────────────────────────────────────────────

#[derive(Default)]
struct BucketAccumulator {
    cpu: f64,
    memory: f64,
    samples: usize,
}

/// Mean CPU and memory per `(entity, bucket)`.
///
/// Buckets are `bucket_secs` wide and aligned to the epoch. Empty buckets are
/// not produced. Output is ordered by entity name, then bucket start.
pub fn aggregate_resources(
    snapshots: &[ResourceSnapshot],
    bucket_secs: u32,
) -> Result<Vec<ResourceBucket>> {
    let mut ordered: Vec<&ResourceSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| {
        a.entity_name
            .cmp(&b.entity_name)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.cpu_cores.total_cmp(&b.cpu_cores))
            .then_with(|| a.memory_megabytes.total_cmp(&b.memory_megabytes))
    });

    let mut buckets: BTreeMap<(&str, DateTime<Utc>), BucketAccumulator> = BTreeMap::new();
    for snap in ordered {
        ensure_finite("CPU", snap.cpu_cores)?;
        ensure_finite("Memory", snap.memory_megabytes)?;

        let acc = buckets
            .entry((
                snap.entity_name.as_str(),
                bucket_start(snap.timestamp, bucket_secs),
            ))
            .or_default();
        acc.cpu += snap.cpu_cores;
        acc.memory += snap.memory_megabytes;
        acc.samples += 1;
    }

    Ok(buckets
        .into_iter()
        .map(|((entity, start), acc)| ResourceBucket {
            entity_name: entity.to_string(),
            bucket_start: start,
            mean_cpu: acc.cpu / acc.samples as f64,
            mean_memory: acc.memory / acc.samples as f64,
            samples: acc.samples,
        })
        .collect())
}

// ── Scaling snapshots ─────────────────────────────────────────────────────────

/// Scaling snapshots pass through unchanged apart from ordering by time.
pub fn order_scaling(mut snapshots: Vec<ScalingSnapshot>) -> Vec<ScalingSnapshot> {
    snapshots.sort_by_key(|s| s.timestamp);
    snapshots
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn ensure_finite(field: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(PipelineError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

//! Schema normalization for the snapshot tables.
//!
//! Resolves every canonical field against an ordered list of accepted column
//! names once per table, then converts each row into the fixed-schema
//! [`ResourceSnapshot`] / [`ScalingSnapshot`] records. Scaling fields with no
//! source column are filled with their documented default and flagged as
//! such.

use loadtest_core::diagnostics::{Diagnostics, Stage};
use loadtest_core::error::PipelineError;
use loadtest_core::models::{
    Normalized, RawTable, ResourceSnapshot, ScalingColumns, ScalingSnapshot, StageOutcome,
};
use loadtest_core::time_utils::parse_timestamp;
use loadtest_core::units::{parse_cpu_cores, parse_memory_megabytes, parse_number};

// ── Column aliases ────────────────────────────────────────────────────────────

/// Accepted source columns for one canonical field, plus its default.
#[derive(Debug, Clone, Copy)]
pub struct FieldAliases {
    pub canonical: &'static str,
    /// Tried in order; the first present header wins.
    pub aliases: &'static [&'static str],
    pub default: f64,
}

impl FieldAliases {
    /// Index of the first alias present in `table`.
    pub fn resolve(&self, table: &RawTable) -> Option<usize> {
        self.aliases.iter().find_map(|name| table.column_index(name))
    }
}

pub const MIN_REPLICAS: FieldAliases = FieldAliases {
    canonical: "MinReplicas",
    aliases: &["MinReplicas", "minReplicas"],
    default: 0.0,
};

pub const MAX_REPLICAS: FieldAliases = FieldAliases {
    canonical: "MaxReplicas",
    aliases: &["MaxReplicas", "maxReplicas"],
    default: 0.0,
};

pub const CURRENT_REPLICAS: FieldAliases = FieldAliases {
    canonical: "CurrentReplicas",
    aliases: &["CurrentReplicas", "currentReplicas"],
    default: 2.0,
};

pub const DESIRED_REPLICAS: FieldAliases = FieldAliases {
    canonical: "DesiredReplicas",
    aliases: &["DesiredReplicas", "desiredReplicas"],
    default: 2.0,
};

pub const CURRENT_CPU: FieldAliases = FieldAliases {
    canonical: "CurrentCPUUtilization",
    aliases: &[
        "CurrentCPUUtilization",
        "currentCPUUtilization",
        "CPUUtilization",
    ],
    default: 30.0,
};

pub const TARGET_CPU: FieldAliases = FieldAliases {
    canonical: "TargetCPUUtilization",
    aliases: &[
        "TargetCPUUtilization",
        "targetCPUUtilization",
        "targetCPU",
    ],
    default: 50.0,
};

const TIMESTAMP_COLUMN: &str = "Timestamp";

const POD_TABLE: &str = "pod metrics";
const HPA_TABLE: &str = "HPA metrics";

// ── Resource snapshots ────────────────────────────────────────────────────────

/// Convert the pod table into [`ResourceSnapshot`]s.
///
/// A missing `Name`, `Timestamp`, `CPU` or `Memory` column makes the whole
/// source absent. Rows with an unreadable timestamp, CPU or memory cell are
/// dropped with a warning.
pub fn normalize_resources(
    table: &RawTable,
    diag: &dyn Diagnostics,
) -> StageOutcome<Vec<ResourceSnapshot>> {
    if table.is_empty() {
        diag.info(Stage::Normalizer, "Pod metrics table has no rows");
        return StageOutcome::Absent;
    }

    let Some([name_col, ts_col, cpu_col, mem_col]) =
        require_columns(table, POD_TABLE, ["Name", TIMESTAMP_COLUMN, "CPU", "Memory"], diag)
    else {
        return StageOutcome::Absent;
    };

    let mut snapshots = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let cell = |col| table.cell(row, col).unwrap_or("");

        let entity_name = cell(name_col);
        if entity_name.is_empty() {
            diag.warn(
                Stage::Normalizer,
                &format!("Dropping pod metrics row {}: empty Name", row + 1),
            );
            continue;
        }
        let Some(timestamp) = parse_timestamp(cell(ts_col)) else {
            diag.warn(
                Stage::Normalizer,
                &format!(
                    "Dropping pod metrics row {}: {}",
                    row + 1,
                    PipelineError::TimestampParse(cell(ts_col).to_string())
                ),
            );
            continue;
        };
        let (Some(cpu_cores), Some(memory_megabytes)) = (
            parse_cpu_cores(cell(cpu_col)),
            parse_memory_megabytes(cell(mem_col)),
        ) else {
            diag.warn(
                Stage::Normalizer,
                &format!(
                    "Dropping pod metrics row {}: unreadable usage CPU={:?} Memory={:?}",
                    row + 1,
                    cell(cpu_col),
                    cell(mem_col)
                ),
            );
            continue;
        };

        snapshots.push(ResourceSnapshot {
            entity_name: entity_name.to_string(),
            timestamp,
            cpu_cores,
            memory_megabytes,
        });
    }

    if snapshots.is_empty() {
        diag.warn(Stage::Normalizer, "No usable rows in pod metrics");
        return StageOutcome::Absent;
    }
    StageOutcome::Ready(snapshots)
}

// ── Scaling snapshots ─────────────────────────────────────────────────────────

/// Convert the autoscaler table into fully-populated [`ScalingSnapshot`]s.
///
/// Every field absent from the table is announced once through
/// [`Diagnostics::synthesized_default`] and carried as
/// [`FieldSource::Defaulted`](loadtest_core::models::FieldSource::Defaulted).
pub fn normalize_scaling(
    table: &RawTable,
    diag: &dyn Diagnostics,
) -> StageOutcome<Vec<ScalingSnapshot>> {
    if table.is_empty() {
        diag.info(Stage::Normalizer, "HPA metrics table has no rows");
        return StageOutcome::Absent;
    }

    let Some([ts_col]) = require_columns(table, HPA_TABLE, [TIMESTAMP_COLUMN], diag) else {
        return StageOutcome::Absent;
    };

    let resolve = |field: &FieldAliases| {
        let col = field.resolve(table);
        if col.is_none() {
            diag.synthesized_default(
                Stage::Normalizer,
                HPA_TABLE,
                field.canonical,
                &field.default.to_string(),
            );
        }
        col
    };
    let min_col = resolve(&MIN_REPLICAS);
    let max_col = resolve(&MAX_REPLICAS);
    let current_col = resolve(&CURRENT_REPLICAS);
    let desired_col = resolve(&DESIRED_REPLICAS);
    let current_cpu_col = resolve(&CURRENT_CPU);
    let target_cpu_col = resolve(&TARGET_CPU);

    let mut snapshots = Vec::with_capacity(table.len());
    for row in 0..table.len() {
        let raw_ts = table.cell(row, ts_col).unwrap_or("");
        let Some(timestamp) = parse_timestamp(raw_ts) else {
            diag.warn(
                Stage::Normalizer,
                &format!(
                    "Dropping HPA metrics row {}: {}",
                    row + 1,
                    PipelineError::TimestampParse(raw_ts.to_string())
                ),
            );
            continue;
        };

        snapshots.push(ScalingSnapshot {
            timestamp,
            min_replicas: replica_field(table, row, min_col, &MIN_REPLICAS),
            max_replicas: replica_field(table, row, max_col, &MAX_REPLICAS),
            current_replicas: replica_field(table, row, current_col, &CURRENT_REPLICAS),
            desired_replicas: replica_field(table, row, desired_col, &DESIRED_REPLICAS),
            current_cpu_pct: current_cpu_field(table, row, current_cpu_col),
            target_cpu_pct: percent_field(table, row, target_cpu_col, &TARGET_CPU),
        });
    }

    if snapshots.is_empty() {
        diag.warn(Stage::Normalizer, "No usable rows in HPA metrics");
        return StageOutcome::Absent;
    }
    StageOutcome::Ready(snapshots)
}

// ── Exact-name scaling columns ────────────────────────────────────────────────

/// Read the scaling table by exact canonical column names only.
///
/// No aliases and no defaults: a column missing from the header is `None`.
/// Rows with an unreadable timestamp are skipped so that every column stays
/// aligned with `timestamps`.
pub fn scaling_columns(table: &RawTable, diag: &dyn Diagnostics) -> ScalingColumns {
    let Some(ts_col) = table.column_index(TIMESTAMP_COLUMN) else {
        diag.warn(
            Stage::Normalizer,
            &PipelineError::MissingColumn {
                table: HPA_TABLE.to_string(),
                column: TIMESTAMP_COLUMN.to_string(),
            }
            .to_string(),
        );
        return ScalingColumns::default();
    };

    let rows: Vec<usize> = (0..table.len())
        .filter(|&row| parse_timestamp(table.cell(row, ts_col).unwrap_or("")).is_some())
        .collect();

    let column = |name: &str| {
        table.column_index(name).map(|col| {
            rows.iter()
                .map(|&row| table.cell(row, col).and_then(parse_number))
                .collect::<Vec<_>>()
        })
    };

    ScalingColumns {
        timestamps: rows
            .iter()
            .filter_map(|&row| parse_timestamp(table.cell(row, ts_col).unwrap_or("")))
            .collect(),
        current_replicas: column(CURRENT_REPLICAS.canonical),
        desired_replicas: column(DESIRED_REPLICAS.canonical),
        current_cpu_pct: column(CURRENT_CPU.canonical),
        target_cpu_pct: column(TARGET_CPU.canonical),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Indices of `columns` in `table`, or `None` after a warning naming the
/// first missing one.
fn require_columns<const N: usize>(
    table: &RawTable,
    table_name: &str,
    columns: [&str; N],
    diag: &dyn Diagnostics,
) -> Option<[usize; N]> {
    let mut indices = [0usize; N];
    for (slot, column) in indices.iter_mut().zip(columns) {
        match table.column_index(column) {
            Some(idx) => *slot = idx,
            None => {
                let err = PipelineError::MissingColumn {
                    table: table_name.to_string(),
                    column: column.to_string(),
                };
                diag.warn(Stage::Normalizer, &err.to_string());
                return None;
            }
        }
    }
    Some(indices)
}

fn replica_field(
    table: &RawTable,
    row: usize,
    col: Option<usize>,
    field: &FieldAliases,
) -> Normalized<u32> {
    let default = field.default as u32;
    let Some(col) = col else {
        return Normalized::defaulted(default);
    };
    match table.cell(row, col).and_then(parse_number) {
        Some(v) if v >= 0.0 && v <= f64::from(u32::MAX) => Normalized::observed(v.round() as u32),
        _ => Normalized::unparsable(default),
    }
}

fn percent_field(
    table: &RawTable,
    row: usize,
    col: Option<usize>,
    field: &FieldAliases,
) -> Normalized<f64> {
    let Some(col) = col else {
        return Normalized::defaulted(field.default);
    };
    match table.cell(row, col).and_then(parse_number) {
        Some(v) => Normalized::observed(v),
        None => Normalized::unparsable(field.default),
    }
}

fn current_cpu_field(table: &RawTable, row: usize, col: Option<usize>) -> Normalized<Option<f64>> {
    let Some(col) = col else {
        return Normalized::defaulted(Some(CURRENT_CPU.default));
    };
    match table.cell(row, col).and_then(parse_number) {
        Some(v) => Normalized::observed(Some(v)),
        None => Normalized::unparsable(None),
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

// ── Percentile helper ─────────────────────────────────────────────────────────

/// Compute the `p`-th percentile of a **sorted** slice using standard linear
/// interpolation (the same algorithm used by NumPy's `percentile` function).
///
/// Returns `0.0` for an empty slice.
pub fn percentile(sorted_data: &[f64], p: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    let len = sorted_data.len();
    if len == 1 {
        return sorted_data[0];
    }
    let rank = (p / 100.0) * (len as f64 - 1.0);
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted_data[lo];
    }
    let frac = rank - lo as f64;
    sorted_data[lo] + frac * (sorted_data[hi] - sorted_data[lo])
}

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Largest value; `None` for an empty slice.
pub fn max(values: &[f64]) -> Option<f64> {
    values.iter().copied().reduce(f64::max)
}

// ── SummaryStats ──────────────────────────────────────────────────────────────

/// The five figures reported per request metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SummaryStats {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub p90: f64,
    pub p95: f64,
}

impl SummaryStats {
    /// Summarise `values` in any order.
    ///
    /// The values are sorted (and summed) in ascending order first, so the
    /// result does not depend on the order of the input. Returns `None` when
    /// `values` is empty.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Self {
            min: sorted[0],
            mean: mean(&sorted)?,
            max: sorted[sorted.len() - 1],
            p90: percentile(&sorted, 90.0),
            p95: percentile(&sorted, 95.0),
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────

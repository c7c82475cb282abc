//! Kubernetes resource-quantity parsing.
//!
//! CPU readings arrive as `"500m"` (milli-cores) or `"1"` (cores); memory
//! readings as `"128Ki"`, `"256Mi"`, `"1Gi"` or a bare megabyte figure.

/// Parse a CPU quantity into whole cores.
///
/// Returns `None` for empty, non-numeric, non-finite or negative input.
///
/// # Examples
///
/// ```
/// use loadtest_core::units::parse_cpu_cores;
///
/// assert_eq!(parse_cpu_cores("500m"), Some(0.5));
/// assert_eq!(parse_cpu_cores("2"), Some(2.0));
/// assert_eq!(parse_cpu_cores("lots"), None);
/// ```
pub fn parse_cpu_cores(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let cores = match s.strip_suffix('m') {
        Some(milli) => parse_number(milli)? / 1000.0,
        None => parse_number(s)?,
    };
    non_negative(cores)
}

/// Parse a memory quantity into megabytes.
///
/// `Ki` divides by 1024, `Mi` is taken as-is, `Gi` multiplies by 1024 and an
/// unsuffixed figure is already in megabytes.
///
/// # Examples
///
/// ```
/// use loadtest_core::units::parse_memory_megabytes;
///
/// assert_eq!(parse_memory_megabytes("256Mi"), Some(256.0));
/// assert_eq!(parse_memory_megabytes("1Gi"), Some(1024.0));
/// assert_eq!(parse_memory_megabytes("512Ki"), Some(0.5));
/// assert_eq!(parse_memory_megabytes("64"), Some(64.0));
/// ```
pub fn parse_memory_megabytes(raw: &str) -> Option<f64> {
    let s = raw.trim();
    let megabytes = if let Some(kib) = s.strip_suffix("Ki") {
        parse_number(kib)? / 1024.0
    } else if let Some(mib) = s.strip_suffix("Mi") {
        parse_number(mib)?
    } else if let Some(gib) = s.strip_suffix("Gi") {
        parse_number(gib)? * 1024.0
    } else {
        parse_number(s)?
    };
    non_negative(megabytes)
}

/// Coerce a table cell to a finite number; anything else is `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn non_negative(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── CPU ───────────────────────────────────────────────────────────────────

    #[test]
    fn test_cpu_millicores() {
        assert_eq!(parse_cpu_cores("500m"), Some(0.5));
        assert_eq!(parse_cpu_cores("1500m"), Some(1.5));
        assert_eq!(parse_cpu_cores("0m"), Some(0.0));
    }

    #[test]
    fn test_cpu_whole_cores() {
        assert_eq!(parse_cpu_cores("2"), Some(2.0));
        assert_eq!(parse_cpu_cores("0.25"), Some(0.25));
        assert_eq!(parse_cpu_cores(" 1 "), Some(1.0));
    }

    #[test]
    fn test_cpu_rejects_garbage_and_negatives() {
        assert_eq!(parse_cpu_cores(""), None);
        assert_eq!(parse_cpu_cores("m"), None);
        assert_eq!(parse_cpu_cores("abc"), None);
        assert_eq!(parse_cpu_cores("-100m"), None);
        assert_eq!(parse_cpu_cores("NaN"), None);
    }

    // ── Memory ────────────────────────────────────────────────────────────────

    #[test]
    fn test_memory_suffixes() {
        assert_eq!(parse_memory_megabytes("256Mi"), Some(256.0));
        assert_eq!(parse_memory_megabytes("1Gi"), Some(1024.0));
        assert_eq!(parse_memory_megabytes("512Ki"), Some(0.5));
        assert_eq!(parse_memory_megabytes("128Ki"), Some(0.125));
    }

    #[test]
    fn test_memory_unsuffixed_is_megabytes() {
        assert_eq!(parse_memory_megabytes("300"), Some(300.0));
        assert_eq!(parse_memory_megabytes("12.5"), Some(12.5));
    }

    #[test]
    fn test_memory_rejects_garbage() {
        assert_eq!(parse_memory_megabytes("Mi"), None);
        assert_eq!(parse_memory_megabytes("lotsGi"), None);
        assert_eq!(parse_memory_megabytes("-1Gi"), None);
        assert_eq!(parse_memory_megabytes("inf"), None);
    }

    // ── parse_number ──────────────────────────────────────────────────────────

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" 3.5 "), Some(3.5));
        assert_eq!(parse_number("<unknown>"), None);
        assert_eq!(parse_number(""), None);
    }
}

/// Format a number with thousands separators and a fixed number of decimal
/// places.
///
/// # Examples
///
/// ```
/// use loadtest_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1,234.5");
/// assert_eq!(format_number(87.123, 2), "87.12");
/// assert_eq!(format_number(-9876.6, 0), "-9,877");
/// ```
pub fn format_number(value: f64, decimals: usize) -> String {
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::new();
    // "-0.00" reads badly in a table.
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part));
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    out
}

/// CPU usage in cores with three decimals, e.g. `"0.512 cores"`.
pub fn format_cores(cores: f64) -> String {
    format!("{} cores", format_number(cores, 3))
}

/// Memory in megabytes with one decimal, e.g. `"256.0 MB"`.
pub fn format_megabytes(megabytes: f64) -> String {
    format!("{} MB", format_number(megabytes, 1))
}

/// Percentage with one decimal, e.g. `"42.5%"`.
pub fn format_percent(pct: f64) -> String {
    format!("{}%", format_number(pct, 1))
}

/// Human-readable heading for a chart file stem: `"pod_api_cpu"` →
/// `"pod api cpu"`.
pub fn title_from_stem(stem: &str) -> String {
    stem.replace('_', " ")
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert commas every three digits from the right of an integer string.
fn group_thousands(digits: &str) -> String {
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────

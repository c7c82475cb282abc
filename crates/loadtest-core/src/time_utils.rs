use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Uses the `iana-time-zone` crate directly – no subprocess calls.
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

/// Resolve an IANA timezone name, falling back to UTC with a warning.
pub fn resolve_timezone(tz_name: &str) -> Tz {
    tz_name.parse::<Tz>().unwrap_or_else(|_| {
        warn!(
            "unrecognised timezone \"{}\", falling back to UTC",
            tz_name
        );
        Tz::UTC
    })
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Naive layouts accepted after RFC 3339 fails; interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a point-stream or table timestamp into UTC.
///
/// Handles RFC 3339 with a `Z` suffix or a fixed offset, and the common naive
/// `date time` layouts. Returns `None` for empty or unrecognised input.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Replace trailing 'Z' with '+00:00' for RFC 3339 compatibility.
    let normalised = if let Some(stripped) = s.strip_suffix('Z') {
        format!("{}+00:00", stripped)
    } else {
        s.to_string()
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalised) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS.iter().find_map(|fmt| {
        chrono::NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

// ── Bucketing ─────────────────────────────────────────────────────────────────

/// Start of the fixed-width bucket containing `ts`.
///
/// Buckets are aligned to the Unix epoch, so with a 30 second width
/// `00:00:05` and `00:00:20` both map to `00:00:00`.
pub fn bucket_start(ts: DateTime<Utc>, width_secs: u32) -> DateTime<Utc> {
    let width = i64::from(width_secs.max(1));
    let floored = ts.timestamp().div_euclid(width) * width;
    Utc.timestamp_opt(floored, 0).single().unwrap_or(ts)
}

// ── Formatting ────────────────────────────────────────────────────────────────

/// Format `ts` as `YYYY-MM-DD HH:MM:SS` in `tz`.
pub fn format_in_timezone(ts: DateTime<Utc>, tz: &Tz) -> String {
    ts.with_timezone(tz).format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    // ── parse_timestamp ──────────────────────────────────────────────────────

    #[test]
    fn test_parse_z_suffix() {
        let ts = parse_timestamp("2024-03-01T12:00:05Z").unwrap();
        assert_eq!(ts, utc("2024-03-01T12:00:05+00:00"));
    }

    #[test]
    fn test_parse_fractional_with_offset() {
        let ts = parse_timestamp("2024-03-01T14:00:05.250+02:00").unwrap();
        assert_eq!(ts, utc("2024-03-01T12:00:05.250+00:00"));
    }

    #[test]
    fn test_parse_naive_is_utc() {
        let ts = parse_timestamp("2024-03-01 12:00:05").unwrap();
        assert_eq!(ts, utc("2024-03-01T12:00:05Z"));
        let ts = parse_timestamp("2024-03-01T12:00:05.5").unwrap();
        assert_eq!(ts, utc("2024-03-01T12:00:05.5Z"));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("   ").is_none());
        assert!(parse_timestamp("yesterday").is_none());
    }

    // ── bucket_start ─────────────────────────────────────────────────────────

    #[test]
    fn test_bucket_start_same_window() {
        let a = bucket_start(utc("2024-03-01T00:00:05Z"), 30);
        let b = bucket_start(utc("2024-03-01T00:00:20Z"), 30);
        assert_eq!(a, b);
        assert_eq!(a, utc("2024-03-01T00:00:00Z"));
    }

    #[test]
    fn test_bucket_start_boundary() {
        assert_eq!(
            bucket_start(utc("2024-03-01T00:00:30Z"), 30),
            utc("2024-03-01T00:00:30Z")
        );
        assert_eq!(
            bucket_start(utc("2024-03-01T00:00:29.999Z"), 30),
            utc("2024-03-01T00:00:00Z")
        );
    }

    #[test]
    fn test_bucket_start_zero_width_is_clamped() {
        let ts = utc("2024-03-01T00:00:07Z");
        assert_eq!(bucket_start(ts, 0), ts);
    }

    // ── timezone ─────────────────────────────────────────────────────────────

    #[test]
    fn test_resolve_timezone_fallback() {
        assert_eq!(resolve_timezone("Not/AZone"), Tz::UTC);
        assert_eq!(resolve_timezone("Europe/Berlin"), Tz::Europe__Berlin);
    }

    #[test]
    fn test_format_in_timezone() {
        let ts = utc("2024-01-15T10:00:00Z");
        assert_eq!(format_in_timezone(ts, &Tz::UTC), "2024-01-15 10:00:00");
        assert_eq!(
            format_in_timezone(ts, &Tz::Europe__Berlin),
            "2024-01-15 11:00:00"
        );
    }

    #[test]
    fn test_get_system_timezone_non_empty() {
        assert!(!get_system_timezone().is_empty());
    }
}

/// Reading staleness detection.
///
/// The importer is expected to append a reading per reservoir on every
/// scheduled run. If it stops (the gateway changes, the job is disabled) the
/// dashboard keeps showing old lines with no obvious sign of it. This module
/// decides whether the newest reading is too old so the sink can say so next
/// to the last-sync time.
///
/// # Clock injection
/// All functions accept a `now: DateTime<Utc>` parameter rather than calling
/// `Utc::now()` internally, keeping tests deterministic.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Formats SQLite `DATETIME` text is commonly written in.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    /// Newest reading older than this is stale.
    pub max_age_minutes: u64,
    /// Offset applied to timestamps that carry none. The importer writes
    /// local China Standard Time, hence +8.
    pub utc_offset_hours: i32,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        FreshnessConfig {
            max_age_minutes: 36 * 60,
            utc_offset_hours: 8,
        }
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a `record_time` value.
///
/// RFC 3339 strings keep their own offset. Naive strings (the usual case)
/// are interpreted at `utc_offset_hours`.
pub fn parse_record_time(text: &str, utc_offset_hours: i32) -> Result<DateTime<Utc>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty record_time".to_string());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }

    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| format!("invalid UTC offset: {} hours", utc_offset_hours))?;

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| format!("ambiguous local time '{}'", text));
        }
    }

    Err(format!("unrecognized record_time '{}'", text))
}

// ---------------------------------------------------------------------------
// Staleness check
// ---------------------------------------------------------------------------

/// Returns `true` if `record_time` is older than the configured maximum age
/// relative to `now`.
///
/// Staleness is strictly greater than the threshold:
///   age > max_age_minutes  →  stale
///   age == max_age_minutes →  not stale
///
/// Returns an error if `record_time` cannot be parsed. Callers should treat
/// parse failures as stale.
pub fn is_stale_at(
    record_time: &str,
    config: &FreshnessConfig,
    now: DateTime<Utc>,
) -> Result<bool, String> {
    let reading_time = parse_record_time(record_time, config.utc_offset_hours)?;
    let age_minutes = (now - reading_time).num_minutes();
    // Readings from the future are not stale.
    Ok(age_minutes > 0 && age_minutes as u64 > config.max_age_minutes)
}

/// Convenience wrapper that uses the real current time.
pub fn is_stale(record_time: &str, config: &FreshnessConfig) -> Result<bool, String> {
    is_stale_at(record_time, config, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    /// A fixed "now": 2025-06-01 12:00:00 UTC, i.e. 20:00 in Beijing.
    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn config(max_age_minutes: u64) -> FreshnessConfig {
        FreshnessConfig {
            max_age_minutes,
            utc_offset_hours: 8,
        }
    }

    // --- Parsing ------------------------------------------------------------

    #[test]
    fn test_naive_time_is_interpreted_at_configured_offset() {
        let parsed = parse_record_time("2025-06-01 20:00:00", 8).unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn test_python_microsecond_timestamps_parse() {
        // sqlite3 adapters write datetime.now() with microseconds.
        let parsed = parse_record_time("2025-06-01 20:00:00.123456", 8).unwrap();
        assert_eq!(parsed.timestamp(), fixed_now().timestamp());
    }

    #[test]
    fn test_rfc3339_keeps_its_own_offset() {
        let parsed = parse_record_time("2025-06-01T12:00:00Z", 8).unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn test_t_separator_without_offset_parses() {
        let parsed = parse_record_time("2025-06-01T20:00:00", 8).unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn test_garbage_and_empty_are_errors() {
        assert!(parse_record_time("not-a-datetime", 8).is_err());
        assert!(parse_record_time("", 8).is_err());
    }

    #[test]
    fn test_out_of_range_offset_is_error() {
        let err = parse_record_time("2025-06-01 08:00:00", 1_000_000).unwrap_err();
        assert!(err.contains("invalid UTC offset"), "got: {}", err);
        assert!(parse_record_time("2025-06-01 08:00:00", 24).is_err());
        assert!(parse_record_time("2025-06-01 08:00:00", -23).is_ok());
    }

    // --- Staleness ----------------------------------------------------------

    #[test]
    fn test_recent_reading_is_not_stale() {
        let stale = is_stale_at("2025-06-01 19:30:00", &config(60), fixed_now()).unwrap();
        assert!(!stale, "30-minute-old reading should not be stale with 60-min threshold");
    }

    #[test]
    fn test_reading_exactly_at_threshold_is_not_stale() {
        let stale = is_stale_at("2025-06-01 19:00:00", &config(60), fixed_now()).unwrap();
        assert!(!stale, "staleness is strictly greater than, not >=");
    }

    #[test]
    fn test_reading_one_minute_past_threshold_is_stale() {
        let stale = is_stale_at("2025-06-01 18:59:00", &config(60), fixed_now()).unwrap();
        assert!(stale);
    }

    #[test]
    fn test_future_reading_is_not_stale() {
        let stale = is_stale_at("2025-06-02 08:00:00", &config(60), fixed_now()).unwrap();
        assert!(!stale);
    }

    #[test]
    fn test_same_reading_stale_under_tight_threshold_not_under_loose() {
        let reading = "2025-06-01 08:00:00"; // 12 hours old
        assert!(is_stale_at(reading, &config(60), fixed_now()).unwrap());
        assert!(!is_stale_at(reading, &config(24 * 60), fixed_now()).unwrap());
    }

    #[test]
    fn test_unparseable_time_is_error() {
        assert!(is_stale_at("--", &config(60), fixed_now()).is_err());
    }
}

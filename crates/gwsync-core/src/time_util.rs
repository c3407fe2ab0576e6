//! Gateway timestamp parsing.
//!
//! The gateway emits timestamps in several shapes depending on the request
//! and server version:
//! - `"YYYYMMDD"` (date only)
//! - unix seconds as a decimal string
//! - `"YYYYMMDD HH:MM:SS"` / `"YYYYMMDD-HH:MM:SS"`, optionally followed by a
//!   time-zone name
//!
//! Everything normalizes to `DateTime<Utc>`. Zone names resolve through a
//! fixed-offset table of the names the gateway actually sends; unknown names
//! fall back to UTC with a warning.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::error::GwError;

// ---------------------------------------------------------------------------
// Zone table
// ---------------------------------------------------------------------------

/// Standard (non-DST) offsets for the zone names seen in gateway output.
fn zone_offset_secs(name: &str) -> Option<i32> {
    let hours = match name {
        "UTC" | "GMT" | "Europe/London" | "GB" => 0,
        "US/Eastern" | "America/New_York" | "EST" => -5,
        "US/Central" | "America/Chicago" | "CST" => -6,
        "US/Mountain" | "America/Denver" | "MST" => -7,
        "US/Pacific" | "America/Los_Angeles" | "PST" => -8,
        "Europe/Paris" | "Europe/Berlin" | "Europe/Zurich" | "MET" | "CET" => 1,
        "Europe/Helsinki" | "EET" => 2,
        "Asia/Hong_Kong" | "Asia/Shanghai" | "Asia/Singapore" | "HKT" => 8,
        "Asia/Tokyo" | "JST" => 9,
        "Australia/Sydney" | "Australia/NSW" | "AET" => 10,
        _ => return None,
    };
    Some(hours * 3600)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse any of the gateway's timestamp shapes into UTC.
pub fn parse_gateway_time(s: &str) -> Result<DateTime<Utc>, GwError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(GwError::BadTimestamp(s.into()));
    }

    if s.bytes().all(|b| b.is_ascii_digit()) {
        if s.len() == 8 {
            let date = NaiveDate::parse_from_str(s, "%Y%m%d")
                .map_err(|_| GwError::BadTimestamp(s.into()))?;
            let naive = date
                .and_hms_opt(0, 0, 0)
                .ok_or_else(|| GwError::BadTimestamp(s.into()))?;
            return Ok(Utc.from_utc_datetime(&naive));
        }
        let secs: i64 = s.parse().map_err(|_| GwError::BadTimestamp(s.into()))?;
        return DateTime::from_timestamp(secs, 0).ok_or_else(|| GwError::BadTimestamp(s.into()));
    }

    // "YYYYMMDD HH:MM:SS" or "YYYYMMDD-HH:MM:SS", with an optional trailing
    // zone name separated by whitespace.
    let (stamp, zone) = match s.rfind(|c: char| c.is_whitespace()) {
        Some(idx) if s[idx + 1..].contains(|c: char| c.is_ascii_alphabetic()) => {
            (s[..idx].trim(), Some(s[idx + 1..].trim()))
        }
        _ => (s, None),
    };

    let naive = parse_naive_stamp(stamp).ok_or_else(|| GwError::BadTimestamp(s.into()))?;

    let offset_secs = match zone {
        None => 0,
        Some(name) => match zone_offset_secs(name) {
            Some(off) => off,
            None => {
                tracing::warn!(zone = name, "unknown time zone in gateway timestamp, assuming UTC");
                0
            }
        },
    };
    let offset =
        FixedOffset::east_opt(offset_secs).ok_or_else(|| GwError::BadTimestamp(s.into()))?;
    match offset.from_local_datetime(&naive).single() {
        Some(t) => Ok(t.with_timezone(&Utc)),
        None => Err(GwError::BadTimestamp(s.into())),
    }
}

fn parse_naive_stamp(stamp: &str) -> Option<NaiveDateTime> {
    for fmt in [
        "%Y%m%d %H:%M:%S",
        "%Y%m%d-%H:%M:%S",
        "%Y%m%d  %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(stamp, fmt) {
            return Some(t);
        }
    }
    None
}

/// Format a `DateTime<Utc>` the way the gateway expects request fields
/// (`"YYYYMMDD-HH:MM:SS"` in UTC).
pub fn format_gateway_time(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d-%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_date_only() {
        let t = parse_gateway_time("20250117").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 17, 0, 0, 0).unwrap());
    }

    #[test]
    fn parses_unix_seconds() {
        let t = parse_gateway_time("1700000000").unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn parses_datetime_with_zone() {
        let t = parse_gateway_time("20250117 09:30:00 US/Eastern").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 17, 14, 30, 0).unwrap());
    }

    #[test]
    fn parses_compact_datetime() {
        let t = parse_gateway_time("20250117-09:30:00").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 17, 9, 30, 0).unwrap());
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        let t = parse_gateway_time("20250117 09:30:00 Mars/Olympus").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2025, 1, 17, 9, 30, 0).unwrap());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_gateway_time("").is_err());
        assert!(parse_gateway_time("not a time").is_err());
    }

    #[test]
    fn round_trips_through_format() {
        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_gateway_time(&format_gateway_time(t)).unwrap(), t);
    }
}

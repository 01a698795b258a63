//! Timestamp cell parsing.
//!
//! Accepts Unix epochs, ISO-8601 / RFC 3339 and common US date-time layouts.
//! Anything without an offset comes back as [`BarTime::Naive`] so the
//! classifier can attach the source timezone.

use barstack_core::BarTime;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Layouts carrying an explicit UTC offset.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f %z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

/// Naive date-time layouts.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Date-only layouts, taken as midnight.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a timestamp cell.
pub fn parse_timestamp(raw: &str) -> Option<BarTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(dt) = parse_epoch(s) {
        return Some(BarTime::Absolute(dt));
    }

    // RFC 3339 covers the `Z` suffix.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(BarTime::Absolute(dt.with_timezone(&Utc)));
    }
    if let Some(body) = s.strip_suffix('Z').or_else(|| s.strip_suffix(" UTC")) {
        if let Some(naive) = parse_naive(body) {
            return Some(BarTime::Absolute(naive.and_utc()));
        }
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(BarTime::Absolute(dt.with_timezone(&Utc)));
        }
    }

    parse_naive(s).map(BarTime::Naive)
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Parse a numeric Unix epoch. The magnitude picks the unit.
fn parse_epoch(s: &str) -> Option<DateTime<Utc>> {
    if !s.bytes().all(|b| b.is_ascii_digit() || b == b'.' || b == b'-') {
        return None;
    }
    // Bare years and compact dates ("2024", "20240102") are not epochs.
    if s.bytes().all(|b| b.is_ascii_digit()) && matches!(s.len(), 4 | 8) {
        return None;
    }
    if let Ok(value) = s.parse::<i64>() {
        let per_second = epoch_units_per_second(value.unsigned_abs() as f64);
        return DateTime::from_timestamp(
            value.div_euclid(per_second),
            (value.rem_euclid(per_second) * (1_000_000_000 / per_second)) as u32,
        );
    }

    let value: f64 = s.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    let secs_f = value / epoch_units_per_second(value.abs()) as f64;
    let secs = secs_f.floor();
    let nanos = (((secs_f - secs) * 1e9).round() as u32).min(999_999_999);
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Units per second implied by an epoch value's magnitude.
fn epoch_units_per_second(magnitude: f64) -> i64 {
    if magnitude > 1e17 {
        1_000_000_000
    } else if magnitude > 1e14 {
        1_000_000
    } else if magnitude > 1e11 {
        1_000
    } else {
        1
    }
}

//! Configuration structures for the barstack pipeline.
//!
//! Every value here is supplied per request. Nothing is cached globally, so
//! two requests with different timezones or session windows can run side by
//! side.

use std::path::Path;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session windows and boundary times.
    pub session: SessionConfig,
    /// Source and reference timezones.
    pub timezones: TimezoneConfig,
    /// CSV parsing rules.
    pub parser: ParserConfig,
    /// Output shaping.
    pub output: OutputConfig,
}

impl Config {
    /// Load a configuration from JSON. Missing sections and fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.parser.delimiter_byte()?;
        Ok(config)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Session boundary configuration.
///
/// All times are wall-clock times in the reference timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Start of the regular session (inclusive).
    #[serde(with = "hhmm")]
    pub regular_open: NaiveTime,
    /// End of the regular session (exclusive).
    #[serde(with = "hhmm")]
    pub regular_close: NaiveTime,
    /// Time of day the previous session is considered closed.
    #[serde(with = "hhmm")]
    pub prev_close_time: NaiveTime,
    /// Time of day the next session opens.
    #[serde(with = "hhmm")]
    pub current_open_time: NaiveTime,
    /// Treat Saturday and Sunday as outside the regular session.
    pub exclude_weekends: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            regular_open: hm(7, 0),
            regular_close: hm(16, 0),
            prev_close_time: hm(16, 0),
            current_open_time: hm(7, 0),
            exclude_weekends: true,
        }
    }
}

impl SessionConfig {
    /// Override the gap boundaries from optional `HH:MM` strings.
    ///
    /// `None` keeps the current value.
    pub fn with_boundaries(
        mut self,
        prev_close_time: Option<&str>,
        current_open_time: Option<&str>,
    ) -> Result<Self> {
        if let Some(s) = prev_close_time {
            self.prev_close_time = parse_hhmm(s)?;
        }
        if let Some(s) = current_open_time {
            self.current_open_time = parse_hhmm(s)?;
        }
        Ok(self)
    }

    /// Override the regular session window from optional `HH:MM` strings.
    pub fn with_regular_window(mut self, open: Option<&str>, close: Option<&str>) -> Result<Self> {
        if let Some(s) = open {
            self.regular_open = parse_hhmm(s)?;
        }
        if let Some(s) = close {
            self.regular_close = parse_hhmm(s)?;
        }
        Ok(self)
    }

    /// Whether `t` lies in the half-open regular window `[regular_open, regular_close)`.
    #[inline]
    pub fn in_regular_window(&self, t: NaiveTime) -> bool {
        window_contains(self.regular_open, self.regular_close, t)
    }

    /// Whether `t` lies in the half-open gap `[prev_close_time, current_open_time)`.
    #[inline]
    pub fn in_gap(&self, t: NaiveTime) -> bool {
        window_contains(self.prev_close_time, self.current_open_time, t)
    }
}

/// Half-open time-of-day window test. `start > end` wraps past midnight,
/// `start == end` is empty.
#[inline]
pub fn window_contains(start: NaiveTime, end: NaiveTime, t: NaiveTime) -> bool {
    if start <= end {
        start <= t && t < end
    } else {
        t >= start || t < end
    }
}

/// Timezone configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimezoneConfig {
    /// Zone attached to timestamps that carry no UTC offset.
    pub source: Tz,
    /// Market timezone used for session classification.
    pub reference: Tz,
}

impl Default for TimezoneConfig {
    fn default() -> Self {
        Self {
            source: Tz::UTC,
            reference: Tz::America__New_York,
        }
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| Error::config(format!("unknown timezone '{name}': {e}")))
}

/// CSV parsing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Field delimiter. Must be a single ASCII character.
    pub delimiter: char,
    /// Prices with a larger magnitude are rejected as extreme.
    pub max_abs_price: f64,
    /// Reject rows where low/high do not bound open and close.
    pub reject_inconsistent_ohlc: bool,
    /// Header names that pin a column, ahead of name matching.
    pub columns: ColumnOverrides,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: ',',
            max_abs_price: 1_000_000_000.0,
            reject_inconsistent_ohlc: true,
            columns: ColumnOverrides::default(),
        }
    }
}

impl ParserConfig {
    /// The delimiter as a byte, as the CSV reader expects it.
    pub fn delimiter_byte(&self) -> Result<u8> {
        if self.delimiter.is_ascii() {
            Ok(self.delimiter as u8)
        } else {
            Err(Error::config(format!(
                "delimiter must be ASCII, got '{}'",
                self.delimiter
            )))
        }
    }
}

/// Explicit header names per column.
///
/// Matched exactly, ignoring case and surrounding whitespace. A set name that
/// is absent from the header is a structural error. Unset roles fall back to
/// name matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnOverrides {
    /// Column holding the full timestamp.
    pub time: Option<String>,
    pub open: Option<String>,
    pub high: Option<String>,
    pub low: Option<String>,
    pub close: Option<String>,
    pub volume: Option<String>,
}

impl ColumnOverrides {
    /// Pin the four price columns to `"{prefix}open"`, `"{prefix}high"` and so on.
    ///
    /// Indicator exports name their series this way, e.g.
    /// `"BLKVOL.ASK.US-BLKVOL.BID.US · USI: open"`.
    pub fn with_price_prefix(prefix: &str) -> Self {
        Self {
            open: Some(format!("{prefix}open")),
            high: Some(format!("{prefix}high")),
            low: Some(format!("{prefix}low")),
            close: Some(format!("{prefix}close")),
            ..Self::default()
        }
    }

    /// Whether no column is pinned.
    pub fn is_empty(&self) -> bool {
        self.time.is_none()
            && self.open.is_none()
            && self.high.is_none()
            && self.low.is_none()
            && self.close.is_none()
            && self.volume.is_none()
    }

    /// Names that are set, for header detection.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        [
            &self.time,
            &self.open,
            &self.high,
            &self.low,
            &self.close,
            &self.volume,
        ]
        .into_iter()
        .filter_map(|name| name.as_deref())
    }
}

/// How `time` is expressed in the chart output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAxis {
    /// True Unix seconds of the instant.
    #[default]
    Absolute,
    /// Reference-zone wall clock encoded as if it were UTC, for chart
    /// libraries that can only render UTC.
    WallClock,
}

/// Output configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Time axis for emitted chart bars.
    pub time_axis: TimeAxis,
    /// Shift prices after each session boundary to close the open gap.
    pub adjust_price_gaps: bool,
    /// Gaps at or below this magnitude are left alone.
    pub gap_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            time_axis: TimeAxis::Absolute,
            adjust_price_gaps: false,
            gap_threshold: 0.01,
        }
    }
}

/// Parse a 24-hour `HH:MM` string.
pub fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| Error::config(format!("invalid time '{s}', expected HH:MM")))
}

/// Format a time of day as `HH:MM`.
pub fn format_hhmm(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

mod hhmm {
    use std::path::Path;

use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_hhmm(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).map_err(de::Error::custom)
    }
}

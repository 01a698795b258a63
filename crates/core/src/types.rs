//! Core data types for the barstack pipeline.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TimeAxis;

/// Timestamp in seconds since Unix epoch (UTC).
pub type TimestampSecs = i64;

/// Timestamp as read from a CSV cell, before timezone resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarTime {
    /// The cell identified an instant (explicit offset, `Z`, or Unix epoch).
    Absolute(DateTime<Utc>),
    /// Wall-clock time with no offset; belongs to the source timezone.
    Naive(NaiveDateTime),
}

impl BarTime {
    /// Whether the timestamp still needs a timezone attached.
    #[inline]
    pub fn is_naive(&self) -> bool {
        matches!(self, BarTime::Naive(_))
    }
}

/// A bar candidate produced by the parser.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBar {
    /// 1-based record number in the source document, header included.
    pub row_number: usize,
    /// Parsed timestamp.
    pub time: BarTime,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume, when the document has a volume column.
    pub volume: Option<f64>,
}

/// A classified bar. Immutable once the classifier has built it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Absolute instant, at the resolution the source provided.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time in the reference timezone.
    pub local_time: NaiveDateTime,
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume (optional).
    pub volume: Option<f64>,
    /// Whether the bar falls inside the regular session.
    pub is_regular_hours: bool,
    /// Source record number.
    pub row_number: usize,
}

impl Bar {
    /// Chart time for this bar on the requested axis.
    #[inline]
    pub fn chart_time(&self, axis: TimeAxis) -> TimestampSecs {
        match axis {
            TimeAxis::Absolute => self.timestamp.timestamp(),
            TimeAxis::WallClock => self.local_time.and_utc().timestamp(),
        }
    }

    /// Project to the shape the charting surface consumes.
    pub fn to_chart_bar(&self, axis: TimeAxis) -> ChartBar {
        ChartBar {
            time: self.chart_time(axis),
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            is_regular_hours: self.is_regular_hours,
        }
    }

    /// Copy of this bar with every price shifted by `delta`.
    pub fn shifted(&self, delta: f64) -> Bar {
        Bar {
            open: self.open + delta,
            high: self.high + delta,
            low: self.low + delta,
            close: self.close + delta,
            ..self.clone()
        }
    }
}

/// One element of the output list handed to the charting surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartBar {
    /// Unix seconds.
    pub time: TimestampSecs,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub is_regular_hours: bool,
}

/// A row the parser had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based record number, header included.
    pub row_number: usize,
    /// Human-readable reason.
    pub reason: String,
}

impl RowError {
    pub fn new(row_number: usize, reason: impl Into<String>) -> Self {
        Self {
            row_number,
            reason: reason.into(),
        }
    }
}

/// Informational marker for the start of a new trading session segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionBoundary {
    /// Index of the first bar of the new segment in the stacked sequence.
    pub index: usize,
    /// Index of the bar whose close is used as `prev_close`.
    pub prev_close_index: usize,
    /// Timestamp of the last bar before the boundary.
    pub prev_timestamp: TimestampSecs,
    /// Timestamp of the first bar after the boundary.
    pub timestamp: TimestampSecs,
    /// Elapsed seconds across the boundary.
    pub gap_seconds: i64,
    /// Close used as the previous session's reference price.
    pub prev_close: f64,
    /// Open of the first bar of the new segment.
    pub open: f64,
    /// `prev_close - open`.
    pub price_gap: f64,
}

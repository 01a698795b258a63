//! Summary of a processed document.

use barstack_core::SessionConfig;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::stacker::BarSequence;

/// First and last reference-zone wall-clock times, ISO-8601.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: String,
    pub end: String,
}

/// Lowest low and highest high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: f64,
    pub high: f64,
}

/// Counts and ranges reported next to the chart data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSummary {
    /// Bars in the output.
    pub total_bars: usize,
    /// Bars flagged regular.
    pub regular_hours: usize,
    /// Bars flagged after-hours.
    pub after_hours: usize,
    /// Bars whose local time lies between `prev_close_time` and `current_open_time`.
    pub gap_window_bars: usize,
    /// Rows the parser skipped.
    pub rejected_rows: usize,
    /// Session segments found by the stacker.
    pub sessions: usize,
    pub date_range: Option<DateRange>,
    pub price_range: Option<PriceRange>,
}

impl ChartSummary {
    /// Summarize a stacked sequence.
    pub fn from_sequence(sequence: &BarSequence, session: &SessionConfig, rejected_rows: usize) -> Self {
        let bars = sequence.bars();
        let regular_hours = sequence.regular_hours().count();

        let date_range = match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some(DateRange {
                start: first.local_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
                end: last.local_time.format("%Y-%m-%dT%H:%M:%S").to_string(),
            }),
            _ => None,
        };

        let low = bars.iter().map(|b| OrderedFloat(b.low)).min();
        let high = bars.iter().map(|b| OrderedFloat(b.high)).max();
        let price_range = low.zip(high).map(|(low, high)| PriceRange {
            low: low.into_inner(),
            high: high.into_inner(),
        });

        Self {
            total_bars: bars.len(),
            regular_hours,
            after_hours: bars.len() - regular_hours,
            gap_window_bars: bars
                .iter()
                .filter(|b| session.in_gap(b.local_time.time()))
                .count(),
            rejected_rows,
            sessions: sequence.session_count(),
            date_range,
            price_range,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacker::stack;
    use barstack_core::Bar;
    use chrono::NaiveDate;

    fn make_bar(h: u32, low: f64, high: f64, is_regular_hours: bool) -> Bar {
        let at = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap();
        Bar {
            timestamp: at.and_utc(),
            local_time: at,
            open: low,
            high,
            low,
            close: high,
            volume: None,
            is_regular_hours,
            row_number: 0,
        }
    }

    #[test]
    fn test_summary_counts() {
        let session = SessionConfig::default();
        let seq = stack(
            vec![
                make_bar(6, 99.0, 100.0, false),
                make_bar(9, 98.5, 101.0, true),
                make_bar(17, 99.5, 103.25, false),
            ],
            &session,
        );
        let summary = ChartSummary::from_sequence(&seq, &session, 2);

        assert_eq!(summary.total_bars, 3);
        assert_eq!(summary.regular_hours, 1);
        assert_eq!(summary.after_hours, 2);
        assert_eq!(summary.gap_window_bars, 2);
        assert_eq!(summary.rejected_rows, 2);
        assert_eq!(summary.sessions, 2);
        let range = summary.date_range.unwrap();
        assert_eq!(range.start, "2024-01-02T06:00:00");
        assert_eq!(range.end, "2024-01-02T17:00:00");
        assert_eq!(
            summary.price_range,
            Some(PriceRange {
                low: 98.5,
                high: 103.25
            })
        );
    }

    #[test]
    fn test_summary_empty() {
        let summary = ChartSummary::from_sequence(&BarSequence::default(), &SessionConfig::default(), 0);
        assert_eq!(summary.total_bars, 0);
        assert_eq!(summary.sessions, 0);
        assert!(summary.date_range.is_none());
        assert!(summary.price_range.is_none());
    }
}

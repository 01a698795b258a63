//! Session stacking.
//!
//! Produces one globally time-ordered sequence and marks where each trading
//! session begins. Timestamps are never rewritten and no bars are created or
//! dropped; the boundaries are metadata for the caller.

use barstack_core::{Bar, ChartBar, SessionBoundary, SessionConfig, TimeAxis};
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How far back (in bars) to search for the configured previous-close bar.
pub const PREV_CLOSE_LOOKBACK: usize = 100;

/// Ordered, immutable output of the stacker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BarSequence {
    bars: Vec<Bar>,
    boundaries: Vec<SessionBoundary>,
}

impl BarSequence {
    pub(crate) fn from_parts(bars: Vec<Bar>, boundaries: Vec<SessionBoundary>) -> Self {
        Self { bars, boundaries }
    }

    /// Number of bars.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    /// Bars in ascending timestamp order.
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    /// Session boundaries in ascending index order.
    pub fn boundaries(&self) -> &[SessionBoundary] {
        &self.boundaries
    }

    /// Consume the sequence, returning its bars.
    pub fn into_bars(self) -> Vec<Bar> {
        self.bars
    }

    /// Bars flagged as regular session.
    pub fn regular_hours(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.iter().filter(|b| b.is_regular_hours)
    }

    /// Bars flagged as after-hours.
    pub fn after_hours(&self) -> impl Iterator<Item = &Bar> + '_ {
        self.bars.iter().filter(|b| !b.is_regular_hours)
    }

    /// Number of session segments.
    pub fn session_count(&self) -> usize {
        if self.bars.is_empty() {
            0
        } else {
            self.boundaries.len() + 1
        }
    }

    /// Contiguous runs of bars belonging to one session.
    pub fn segments(&self) -> Vec<&[Bar]> {
        let mut out = Vec::with_capacity(self.session_count());
        let mut start = 0;
        for boundary in &self.boundaries {
            out.push(&self.bars[start..boundary.index]);
            start = boundary.index;
        }
        if start < self.bars.len() {
            out.push(&self.bars[start..]);
        }
        out
    }

    /// Chart bars with `time` never decreasing.
    ///
    /// Wall-clock times repeat across a fall-back transition; bars in the
    /// repeated hour are pinned to the latest time already emitted.
    fn chart_bars(&self, axis: TimeAxis) -> impl Iterator<Item = ChartBar> + '_ {
        let mut floor = i64::MIN;
        self.bars.iter().map(move |b| {
            let mut chart = b.to_chart_bar(axis);
            chart.time = chart.time.max(floor);
            floor = chart.time;
            chart
        })
    }

    /// The flat list consumed by the charting surface.
    pub fn to_chart_bars(&self, axis: TimeAxis) -> Vec<ChartBar> {
        self.chart_bars(axis).collect()
    }

    /// The two chart series, regular first, each still time-ordered.
    pub fn split_series(&self, axis: TimeAxis) -> (Vec<ChartBar>, Vec<ChartBar>) {
        self.chart_bars(axis).partition(|b| b.is_regular_hours)
    }
}

/// Trading date a local time belongs to: sessions start at `current_open_time`,
/// so anything earlier in the day belongs to the previous date's session.
pub fn session_date(local: NaiveDateTime, session: &SessionConfig) -> NaiveDate {
    if local.time() >= session.current_open_time {
        local.date()
    } else {
        local.date() - Duration::days(1)
    }
}

fn same_minute(local: NaiveDateTime, session: &SessionConfig) -> bool {
    let t = local.time();
    t.hour() == session.prev_close_time.hour() && t.minute() == session.prev_close_time.minute()
}

/// Stacks classified bars into a [`BarSequence`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Stacker {
    session: SessionConfig,
}

impl Stacker {
    /// Create a new stacker.
    pub fn new(session: SessionConfig) -> Self {
        Self { session }
    }

    /// Sort and mark session boundaries.
    pub fn stack(&self, mut bars: Vec<Bar>) -> BarSequence {
        // Stable: equal timestamps keep input order.
        bars.sort_by_key(|b| b.timestamp);

        let mut boundaries = Vec::new();
        let mut segment_start = 0usize;

        for i in 1..bars.len() {
            let prev = &bars[i - 1];
            let current = &bars[i];
            if session_date(prev.local_time, &self.session)
                == session_date(current.local_time, &self.session)
            {
                continue;
            }

            let lookback_floor = segment_start.max(i.saturating_sub(PREV_CLOSE_LOOKBACK));
            let prev_close_index = (lookback_floor..i)
                .rev()
                .find(|&j| same_minute(bars[j].local_time, &self.session))
                .unwrap_or(i - 1);
            let prev_close = bars[prev_close_index].close;

            let boundary = SessionBoundary {
                index: i,
                prev_close_index,
                prev_timestamp: prev.timestamp.timestamp(),
                timestamp: current.timestamp.timestamp(),
                gap_seconds: (current.timestamp - prev.timestamp).num_seconds(),
                prev_close,
                open: current.open,
                price_gap: prev_close - current.open,
            };
            debug!(
                index = i,
                prev_close,
                open = current.open,
                gap = boundary.price_gap,
                gap_seconds = boundary.gap_seconds,
                "session boundary"
            );
            boundaries.push(boundary);
            segment_start = i;
        }

        info!(
            bars = bars.len(),
            sessions = if bars.is_empty() { 0 } else { boundaries.len() + 1 },
            "stacked bars"
        );
        BarSequence::from_parts(bars, boundaries)
    }
}

/// Stack classified bars with the given session configuration.
pub fn stack(bars: Vec<Bar>, session: &SessionConfig) -> BarSequence {
    Stacker::new(*session).stack(bars)
}

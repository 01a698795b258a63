//! Price-gap adjustment across session boundaries.
//!
//! Optional post-processing for charts that should read as one continuous
//! price path: at each boundary the open gap is added to every later bar.

use barstack_core::{Bar, SessionBoundary};
use tracing::{debug, info};

use crate::stacker::BarSequence;

/// Return a new sequence with session-open gaps closed.
///
/// Gaps are measured against the already adjusted previous close, so shifts
/// accumulate. Gaps with magnitude `<= threshold` are left alone. Timestamps,
/// ordering and session flags are untouched; the input is not modified.
pub fn adjust_price_gaps(sequence: &BarSequence, threshold: f64) -> BarSequence {
    let mut bars: Vec<Bar> = Vec::with_capacity(sequence.len());
    let mut boundaries = Vec::with_capacity(sequence.boundaries().len());
    let mut pending = sequence.boundaries().iter().peekable();
    let mut shift = 0.0;
    let mut applied = 0usize;

    for (i, bar) in sequence.bars().iter().enumerate() {
        if let Some(boundary) = pending.next_if(|b| b.index == i) {
            let prev_close = bars
                .get(boundary.prev_close_index)
                .map_or(boundary.prev_close, |b| b.close);
            let gap = prev_close - (bar.open + shift);
            if gap.abs() > threshold {
                shift += gap;
                applied += 1;
                debug!(index = i, gap, remaining = sequence.len() - i, "applied gap adjustment");
            }
            let open = bar.open + shift;
            boundaries.push(SessionBoundary {
                prev_close,
                open,
                price_gap: prev_close - open,
                ..*boundary
            });
        }
        bars.push(bar.shifted(shift));
    }

    info!(adjusted_boundaries = applied, total_shift = shift, "gap adjustment complete");
    BarSequence::from_parts(bars, boundaries)
}

//! Session classification.
//!
//! Resolves every bar to an absolute instant, projects it into the reference
//! (market) timezone and flags it regular or after-hours from its local
//! wall-clock time alone.

use barstack_core::{Bar, BarTime, Config, ParsedBar, SessionConfig};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tracing::{info, warn};

/// Statistics about a classification run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationStats {
    /// Total bars classified.
    pub total_bars: u64,
    /// Bars inside the regular session.
    pub regular_bars: u64,
    /// Bars outside the regular session.
    pub after_hours_bars: u64,
    /// Bars whose timestamp had no offset and got the source timezone.
    pub naive_localized: u64,
    /// Naive timestamps that fell in a repeated (fall-back) hour.
    pub ambiguous_resolved: u64,
    /// Naive timestamps that fell in a skipped (spring-forward) hour.
    pub nonexistent_resolved: u64,
}

impl ClassificationStats {
    /// Get the fraction of bars inside the regular session.
    pub fn regular_frac(&self) -> f64 {
        if self.total_bars > 0 {
            self.regular_bars as f64 / self.total_bars as f64
        } else {
            0.0
        }
    }

    /// Number of bars resolved with a fallback offset.
    pub fn timezone_warnings(&self) -> u64 {
        self.ambiguous_resolved + self.nonexistent_resolved
    }

    /// Reset statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// How a naive wall-clock time mapped onto the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Exactly one instant.
    Exact,
    /// Two candidate instants; the earlier was taken.
    Ambiguous,
    /// No instant; the offset in effect before the transition was applied.
    Nonexistent,
}

/// Attach `tz` to a naive wall-clock time.
///
/// Never fails: a repeated hour resolves to the earlier instant, and a skipped
/// hour is read with the offset in effect before the transition, which lands
/// it just past the gap.
pub fn resolve_local(naive: NaiveDateTime, tz: Tz) -> (DateTime<Utc>, Resolution) {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => (dt.with_timezone(&Utc), Resolution::Exact),
        LocalResult::Ambiguous(earliest, _) => (earliest.with_timezone(&Utc), Resolution::Ambiguous),
        LocalResult::None => {
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix()
                .local_minus_utc();
            let instant = (naive - Duration::seconds(i64::from(before))).and_utc();
            (instant, Resolution::Nonexistent)
        }
    }
}

/// Whether a reference-zone wall-clock time is inside the regular session.
///
/// Pure: depends on nothing but its arguments.
pub fn is_regular_session(local: NaiveDateTime, session: &SessionConfig) -> bool {
    if session.exclude_weekends && matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
        return false;
    }
    session.in_regular_window(local.time())
}

/// Classifier that localizes bars and assigns the session flag.
#[derive(Debug, Clone)]
pub struct SessionClassifier {
    /// Zone for timestamps without an offset.
    source_tz: Tz,
    /// Market zone.
    reference_tz: Tz,
    /// Session windows.
    session: SessionConfig,
    /// Classification statistics.
    stats: ClassificationStats,
}

impl SessionClassifier {
    /// Create a new session classifier.
    pub fn new(source_tz: Tz, reference_tz: Tz, session: SessionConfig) -> Self {
        Self {
            source_tz,
            reference_tz,
            session,
            stats: ClassificationStats::default(),
        }
    }

    /// Create a classifier from the pipeline configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.timezones.source,
            config.timezones.reference,
            config.session,
        )
    }

    /// Resolve a parsed timestamp to an absolute instant.
    pub fn localize(&mut self, time: BarTime) -> DateTime<Utc> {
        match time {
            BarTime::Absolute(dt) => dt,
            BarTime::Naive(naive) => {
                self.stats.naive_localized += 1;
                let (instant, resolution) = resolve_local(naive, self.source_tz);
                match resolution {
                    Resolution::Exact => {}
                    Resolution::Ambiguous => {
                        self.stats.ambiguous_resolved += 1;
                        warn!(%naive, tz = self.source_tz.name(), %instant, "ambiguous local time, using earlier offset");
                    }
                    Resolution::Nonexistent => {
                        self.stats.nonexistent_resolved += 1;
                        warn!(%naive, tz = self.source_tz.name(), %instant, "nonexistent local time, using pre-transition offset");
                    }
                }
                instant
            }
        }
    }

    /// Classify a single bar.
    pub fn classify(&mut self, bar: ParsedBar) -> Bar {
        let instant = self.localize(bar.time);
        let local_time = instant.with_timezone(&self.reference_tz).naive_local();
        let is_regular_hours = is_regular_session(local_time, &self.session);

        self.stats.total_bars += 1;
        if is_regular_hours {
            self.stats.regular_bars += 1;
        } else {
            self.stats.after_hours_bars += 1;
        }

        Bar {
            timestamp: instant,
            local_time,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            is_regular_hours,
            row_number: bar.row_number,
        }
    }

    /// Classify bars, preserving input order.
    pub fn classify_batch(&mut self, bars: Vec<ParsedBar>) -> Vec<Bar> {
        let classified: Vec<Bar> = bars.into_iter().map(|b| self.classify(b)).collect();
        info!(
            regular = self.stats.regular_bars,
            after_hours = self.stats.after_hours_bars,
            timezone_warnings = self.stats.timezone_warnings(),
            "classified bars"
        );
        classified
    }

    /// Get classification statistics.
    pub fn stats(&self) -> &ClassificationStats {
        &self.stats
    }

    /// Reset statistics.
    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }
}

/// Classify bars with explicit timezones and session configuration.
pub fn classify(
    bars: Vec<ParsedBar>,
    source_tz: Tz,
    reference_tz: Tz,
    session: &SessionConfig,
) -> Vec<Bar> {
    SessionClassifier::new(source_tz, reference_tz, *session).classify_batch(bars)
}

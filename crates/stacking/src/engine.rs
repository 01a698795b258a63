//! Chart pipeline.
//!
//! Combines parser, classifier and stacker into a single call per document.

use std::path::Path;

use barstack_core::{ChartBar, Config, Result, RowError, SessionBoundary};
use barstack_ingestion::{ClassificationStats, CsvParser, SessionClassifier};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::gap_adjust::adjust_price_gaps;
use crate::stacker::{BarSequence, Stacker};
use crate::summary::ChartSummary;

/// Everything produced for one document, before shaping for the chart.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Stacked (and, if configured, gap-adjusted) bars.
    pub sequence: BarSequence,
    /// Rows the parser skipped.
    pub errors: Vec<RowError>,
    /// Classification counters, including timezone fallbacks.
    pub stats: ClassificationStats,
}

/// Response handed to the charting surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartResponse {
    /// All bars, time-ordered.
    pub chart_data: Vec<ChartBar>,
    /// Regular-session series.
    pub regular_hours: Vec<ChartBar>,
    /// After-hours series.
    pub after_hours: Vec<ChartBar>,
    /// Skipped rows.
    pub errors: Vec<RowError>,
    /// Session boundaries in `chart_data` index space.
    pub boundaries: Vec<SessionBoundary>,
    pub summary: ChartSummary,
}

/// Parse -> classify -> stack for one request.
///
/// Holds only configuration, so one pipeline can serve concurrent requests.
#[derive(Debug, Clone)]
pub struct ChartPipeline {
    config: Config,
    parser: CsvParser,
}

impl ChartPipeline {
    /// Create a pipeline from configuration.
    pub fn new(config: Config) -> Self {
        let parser = CsvParser::new(config.parser.clone());
        Self { config, parser }
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run the three stages over a raw CSV document.
    pub fn run(&self, raw: &[u8]) -> Result<PipelineOutput> {
        let parsed = self.parser.parse(raw)?;

        let mut classifier = SessionClassifier::from_config(&self.config);
        let classified = classifier.classify_batch(parsed.bars);

        let mut sequence = Stacker::new(self.config.session).stack(classified);
        if self.config.output.adjust_price_gaps && !sequence.boundaries().is_empty() {
            sequence = adjust_price_gaps(&sequence, self.config.output.gap_threshold);
        }

        Ok(PipelineOutput {
            sequence,
            errors: parsed.errors,
            stats: classifier.stats().clone(),
        })
    }

    /// Run the pipeline and shape the result for the chart.
    pub fn process(&self, raw: &[u8]) -> Result<ChartResponse> {
        let output = self.run(raw)?;
        let axis = self.config.output.time_axis;

        let summary =
            ChartSummary::from_sequence(&output.sequence, &self.config.session, output.errors.len());
        let (regular_hours, after_hours) = output.sequence.split_series(axis);

        info!(
            bars = summary.total_bars,
            regular = summary.regular_hours,
            after_hours = summary.after_hours,
            rejected = summary.rejected_rows,
            "formatted chart data"
        );

        Ok(ChartResponse {
            chart_data: output.sequence.to_chart_bars(axis),
            regular_hours,
            after_hours,
            errors: output.errors,
            boundaries: output.sequence.boundaries().to_vec(),
            summary,
        })
    }

    /// Read a CSV file and process it.
    pub fn process_file(&self, path: impl AsRef<Path>) -> Result<ChartResponse> {
        let path = path.as_ref();
        let raw = std::fs::read(path)?;
        info!(file = %path.display(), bytes = raw.len(), "received file");
        self.process(&raw)
    }
}

impl Default for ChartPipeline {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

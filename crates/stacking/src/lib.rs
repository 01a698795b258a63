//! Session stacking and chart shaping for the barstack pipeline.
//!
//! This crate handles:
//! - Time-ordering classified bars and marking session boundaries
//! - Optional price-gap adjustment across boundaries
//! - Summary statistics
//! - The end-to-end chart pipeline

pub mod engine;
pub mod gap_adjust;
pub mod stacker;
pub mod summary;

pub use engine::{ChartPipeline, ChartResponse, PipelineOutput};
pub use gap_adjust::adjust_price_gaps;
pub use stacker::{stack, BarSequence, Stacker};
pub use summary::ChartSummary;

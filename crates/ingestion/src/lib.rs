//! Data ingestion and normalization for the barstack pipeline.
//!
//! This crate handles:
//! - Timestamp parsing (epochs, ISO-8601, US layouts)
//! - CSV parsing with header detection and per-row error reporting
//! - Timezone localization and regular/after-hours session classification

pub mod classifier;
pub mod parser;
pub mod timestamp;

pub use classifier::{classify, is_regular_session, ClassificationStats, SessionClassifier};
pub use parser::{parse, ColumnMap, CsvParser, ParseOutput, TimeColumns};
pub use timestamp::parse_timestamp;

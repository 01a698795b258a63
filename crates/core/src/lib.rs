//! Core types and configuration for the barstack pipeline.
//!
//! This crate provides shared types used across all other crates:
//! - Bar types (parsed candidates, classified bars, chart output)
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::{
    ColumnOverrides, Config, OutputConfig, ParserConfig, SessionConfig, TimeAxis, TimezoneConfig,
};
pub use error::{Error, Result};
pub use types::*;

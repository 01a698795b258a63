//! Error types for the barstack pipeline.
//!
//! Only structural problems surface as [`Error`]. Problems confined to a
//! single CSV row are reported as [`crate::RowError`] values next to the
//! successfully parsed bars.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the barstack pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (bad `HH:MM` string, unknown timezone, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The byte stream could not be decoded as text.
    #[error("Decode error: {0}")]
    Decode(String),

    /// The document contains no records at all.
    #[error("Empty input: the CSV document has no records")]
    EmptyInput,

    /// The first record is neither a recognizable header nor a data row.
    #[error("Header error: {0}")]
    Header(String),

    /// The header is present but required columns could not be located.
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Error::Decode(msg.into())
    }

    /// Create a header error.
    pub fn header(msg: impl Into<String>) -> Self {
        Error::Header(msg.into())
    }

    /// Whether this error was caused by the shape of the input document
    /// rather than by configuration or the surrounding process.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::Decode(_) | Error::EmptyInput | Error::Header(_) | Error::MissingColumns(_)
        )
    }
}

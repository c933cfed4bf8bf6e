// src/utils/error.rs
use thiserror::Error;

use crate::spensiones::models::Frequency;

// Define specific error types for different parts of the application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PeriodError {
    #[error("Invalid period '{token}' for {frequency} dataset: {reason}")]
    InvalidPeriod {
        token: String,
        frequency: Frequency,
        reason: String,
    },

    #[error("Malformed period '{0}': expected YYYY or YYYYMM")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network request failed: {0}")]
    Network(#[from] reqwest::Error), // Automatically convert reqwest errors

    #[error("HTTP error: {0}")]
    Http(reqwest::StatusCode),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("Could not decode {len} bytes (tried {})", .attempted.join(", "))]
    Decode {
        len: usize,
        attempted: Vec<&'static str>,
    },

    #[error("No qualifying table in document")]
    TableNotFound,

    #[error("Table has no data rows")]
    EmptyTable,

    #[error("Invalid selector '{0}'")]
    Selector(String),
}

impl ExtractError {
    /// NotFound and EmptyTable mean "no data for this document", not a failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, ExtractError::TableNotFound | ExtractError::EmptyTable)
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Period resolution failed: {0}")]
    Period(#[from] PeriodError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("{0} period(s) failed")]
    PeriodsFailed(usize),
}

//! Ingestion error types
//!
//! Upload failures are structural: the file cannot be turned into rows at
//! all. Bad field values are not errors here; the engine skips them.

use mule_engine::{ErrorKind, ErrorReport};
use thiserror::Error;

/// Upload decoding failures
#[derive(Error, Debug)]
pub enum IngestError {
    /// File does not carry a `.csv` extension
    #[error("Invalid file type. Only CSV allowed. ({0})")]
    NotCsv(String),

    /// File is not valid UTF-8
    #[error("File encoding error - please use UTF-8 encoded CSV")]
    Encoding,

    /// Header lacks one or more required columns
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Malformed CSV structure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// File could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Error object in the engine's taxonomy; unreadable input is an invalid record set
    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(ErrorKind::InvalidRecord, self.to_string())
    }
}

/// Ingestion result
pub type Result<T> = std::result::Result<T, IngestError>;

//! Error types for the detection engine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Only conditions that abort a run are represented here. Per-record and
/// per-detector problems are recovered locally and reported as
/// [`Issue`]s in the result metadata instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Structural invariant violated (e.g. an edge referencing a missing node)
    #[error("Internal fault: {0}")]
    InternalFault(String),

    /// Configuration values out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Machine-readable kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InternalFault(_) => ErrorKind::InternalFault,
            Error::InvalidConfig(_) | Error::Config(_) | Error::Io(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Single error object surfaced to callers
    pub fn report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Error and issue taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed row, skipped and counted
    InvalidRecord,
    /// No valid records at all
    EmptyInput,
    /// A detector ran out of time or iterations
    BudgetExceeded,
    /// Programming invariant violated
    InternalFault,
    /// Bad configuration
    InvalidConfig,
}

impl ErrorKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRecord => "invalid_record",
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::InternalFault => "internal_fault",
            ErrorKind::InvalidConfig => "invalid_config",
        }
    }

    /// Whether this kind aborts a run
    pub fn is_fatal(&self) -> bool {
        matches!(self, ErrorKind::InternalFault | ErrorKind::InvalidConfig)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serializable error object: machine-readable kind + human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Error kind
    pub kind: ErrorKind,

    /// Human-readable message
    pub message: String,
}

impl ErrorReport {
    /// Create new report
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Non-fatal condition recorded in the result metadata
pub type Issue = ErrorReport;

//! Transaction upload ingestion for the mule ring engine
//!
//! Decodes CSV uploads into [`mule_engine::TransactionRow`]s and hosts the
//! `mule-analyze` command line front end.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod error;
pub mod reader;

pub use error::{IngestError, Result};
pub use reader::{CsvIngestor, REQUIRED_COLUMNS};

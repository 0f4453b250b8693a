//! Mule ring detection engine
//!
//! Finds money-muling structures in a batch of transfers and groups the
//! implicated accounts into fraud rings.
//!
//! # Pipeline
//!
//! - **Graph**: validated rows become a frozen directed multigraph
//! - **Detectors**: cycle, fan-out/fan-in and layering passes run in parallel
//!   over the shared graph, each under its own time and iteration budget
//! - **Scoring**: noisy-OR of match severities per account, 0–100
//! - **Clustering**: union-find over accounts sharing a match
//! - **Result**: ordered, rounded payload plus run metadata
//!
//! # Invariants
//!
//! - The graph is never mutated after construction
//! - Identical input yields identical rings and account ordering
//! - Malformed rows are skipped and counted, never fatal

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod budget;
pub mod clustering;
pub mod config;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod graph;
pub mod metrics;
pub mod result;
pub mod scoring;
pub mod types;

// Re-exports
pub use budget::{Budget, CancelToken};
pub use config::Config;
pub use engine::Analyzer;
pub use error::{Error, ErrorKind, ErrorReport, Issue, Result};
pub use graph::{GraphBuilder, TransactionGraph};
pub use metrics::Metrics;
pub use types::{
    AccountId, AnalysisMetadata, AnalysisResult, FraudRing, PatternMatch, PatternType,
    SkipReason, SkippedRecord, Summary, SuspicionScore, SuspiciousAccount, TransactionRecord,
    TransactionRow,
};

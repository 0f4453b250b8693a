//! Pattern detectors
//!
//! Each detector is an independent read-only pass over the frozen
//! [`TransactionGraph`]. Detectors never see each other's output; the
//! engine gathers their match lists after all of them finish.

pub mod cycle;
pub mod fan;
pub mod layering;

pub use cycle::CycleDetector;
pub use fan::FanDetector;
pub use layering::LayeringDetector;

use crate::{budget::Budget, graph::TransactionGraph, types::PatternMatch};
use std::time::Duration;

/// A read-only pass producing pattern matches
pub trait Detector: Send + Sync {
    /// Stable detector name, used in logs, metrics and metadata
    fn name(&self) -> &'static str;

    /// Share of the run deadline this detector may use
    fn deadline_share(&self) -> f64;

    /// Iteration cap
    fn max_iterations(&self) -> u64;

    /// Scan the graph; stop early once `budget` is spent
    ///
    /// Nodes must be visited lowest id first so truncation is deterministic.
    fn detect(&self, graph: &TransactionGraph, budget: &mut Budget) -> Vec<PatternMatch>;
}

/// What one detector produced
#[derive(Debug, Clone)]
pub struct DetectorReport {
    /// Detector name
    pub detector: &'static str,

    /// Matches found (possibly partial)
    pub matches: Vec<PatternMatch>,

    /// Budget ran out before the scan finished
    pub truncated: bool,

    /// Units of work consumed
    pub iterations: u64,

    /// Wall-clock time spent
    pub elapsed: Duration,
}

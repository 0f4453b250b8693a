//! Metrics collection for observability
//!
//! Prometheus collectors for the analysis pipeline. Each [`Metrics`] owns a
//! private registry, so several analyzers can be instrumented side by side.
//!
//! # Metrics
//!
//! - `mule_analyses_total` - Completed analyses
//! - `mule_records_skipped_total` - Rows rejected by validation
//! - `mule_accounts_flagged_total` - Accounts at or above the flag threshold
//! - `mule_rings_detected_total` - Fraud rings emitted
//! - `mule_detector_truncations_total{detector}` - Detectors stopped by their budget
//! - `mule_detector_duration_seconds{detector}` - Detector run time
//! - `mule_analysis_duration_seconds` - Detection, scoring and clustering time

use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};
use std::sync::Arc;

const DURATION_BUCKETS: [f64; 10] = [0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.0, 5.0, 30.0];

/// Metrics collector
#[derive(Clone)]
pub struct Metrics {
    /// Completed analyses
    pub analyses_total: IntCounter,

    /// Rows skipped during graph construction
    pub records_skipped: IntCounter,

    /// Flagged accounts
    pub accounts_flagged: IntCounter,

    /// Rings detected
    pub rings_detected: IntCounter,

    /// Truncated detector runs, by detector
    pub detector_truncations: IntCounterVec,

    /// Detector run time, by detector
    pub detector_duration: HistogramVec,

    /// Pipeline run time
    pub analysis_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let analyses_total = IntCounter::new("mule_analyses_total", "Completed analyses")?;
        registry.register(Box::new(analyses_total.clone()))?;

        let records_skipped = IntCounter::new("mule_records_skipped_total", "Rows rejected by validation")?;
        registry.register(Box::new(records_skipped.clone()))?;

        let accounts_flagged = IntCounter::new(
            "mule_accounts_flagged_total",
            "Accounts at or above the flag threshold",
        )?;
        registry.register(Box::new(accounts_flagged.clone()))?;

        let rings_detected = IntCounter::new("mule_rings_detected_total", "Fraud rings emitted")?;
        registry.register(Box::new(rings_detected.clone()))?;

        let detector_truncations = IntCounterVec::new(
            Opts::new(
                "mule_detector_truncations_total",
                "Detector runs stopped by their budget",
            ),
            &["detector"],
        )?;
        registry.register(Box::new(detector_truncations.clone()))?;

        let detector_duration = HistogramVec::new(
            HistogramOpts::new("mule_detector_duration_seconds", "Detector run time")
                .buckets(DURATION_BUCKETS.to_vec()),
            &["detector"],
        )?;
        registry.register(Box::new(detector_duration.clone()))?;

        let analysis_duration = Histogram::with_opts(
            HistogramOpts::new(
                "mule_analysis_duration_seconds",
                "Detection, scoring and clustering time",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(analysis_duration.clone()))?;

        Ok(Self {
            analyses_total,
            records_skipped,
            accounts_flagged,
            rings_detected,
            detector_truncations,
            detector_duration,
            analysis_duration,
            registry,
        })
    }

    /// Record one detector run
    pub fn record_detector(&self, detector: &str, duration_seconds: f64, truncated: bool) {
        self.detector_duration
            .with_label_values(&[detector])
            .observe(duration_seconds);
        if truncated {
            self.detector_truncations.with_label_values(&[detector]).inc();
        }
    }

    /// Record a finished analysis
    pub fn record_analysis(&self, skipped: usize, flagged: usize, rings: usize, duration_seconds: f64) {
        self.analyses_total.inc();
        self.records_skipped.inc_by(skipped as u64);
        self.accounts_flagged.inc_by(flagged as u64);
        self.rings_detected.inc_by(rings as u64);
        self.analysis_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics")
            .field("analyses_total", &self.analyses_total.get())
            .finish_non_exhaustive()
    }
}

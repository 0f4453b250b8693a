//! Analysis engine
//!
//! Orchestrates one run: graph construction, parallel detection under
//! budgets, scoring, ring clustering and result assembly.

use crate::{
    budget::{CancelToken, Deadline},
    clustering::RingClusterer,
    config::Config,
    detectors::{CycleDetector, Detector, DetectorReport, FanDetector, LayeringDetector},
    error::{ErrorKind, ErrorReport},
    graph::{GraphBuilder, TransactionGraph},
    metrics::Metrics,
    result::ResultAggregator,
    scoring::SuspicionScorer,
    types::{AnalysisMetadata, AnalysisResult, PatternMatch, TransactionRow},
    Error, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Fraud-ring analyzer
///
/// Holds only immutable configuration between runs; every call to
/// [`Analyzer::analyze`] starts from scratch.
pub struct Analyzer {
    /// Configuration
    config: Config,

    /// Detectors, in result order
    detectors: Vec<Box<dyn Detector>>,

    /// Scorer
    scorer: SuspicionScorer,

    /// Optional metrics sink
    metrics: Option<Arc<Metrics>>,
}

impl Analyzer {
    /// Create new analyzer
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(CycleDetector::new(&config.cycle, config.engine.cycle_share)),
            Box::new(FanDetector::new(&config.fan, config.engine.fan_share)),
            Box::new(LayeringDetector::new(&config.layering, config.engine.layering_share)),
        ];
        let scorer = SuspicionScorer::new(config.scoring.flag_threshold);

        Ok(Self {
            config,
            detectors,
            scorer,
            metrics: None,
        })
    }

    /// Record run metrics into `metrics`
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Analyze a batch of rows
    pub fn analyze(&self, rows: &[TransactionRow]) -> Result<AnalysisResult> {
        self.analyze_with_cancel(rows, &CancelToken::new())
    }

    /// Analyze a batch of rows; cancelling `cancel` truncates every detector
    pub fn analyze_with_cancel(&self, rows: &[TransactionRow], cancel: &CancelToken) -> Result<AnalysisResult> {
        let analysis_id = Uuid::new_v4();
        let span = tracing::info_span!("analysis", id = %analysis_id);
        let _guard = span.enter();

        tracing::info!("Starting analysis of {} rows", rows.len());

        // Step 1: Build and freeze the graph
        let outcome = GraphBuilder::build(rows);
        let graph = &outcome.graph;
        if let Err(e) = graph.verify() {
            tracing::error!("Graph verification failed: {}", e);
            return Err(e);
        }

        let mut issues = Vec::new();
        if !outcome.skipped.is_empty() {
            tracing::warn!(
                "Skipped {} of {} rows failing validation",
                outcome.skipped.len(),
                outcome.records_received
            );
            issues.push(ErrorReport::new(
                ErrorKind::InvalidRecord,
                format!(
                    "{} of {} rows skipped during validation",
                    outcome.skipped.len(),
                    outcome.records_received
                ),
            ));
        }

        tracing::info!(
            "Graph built: {} accounts, {} transactions",
            graph.node_count(),
            graph.edge_count()
        );

        // Step 2: Detection
        let started = Instant::now();
        let reports = if graph.is_empty() {
            issues.push(ErrorReport::new(ErrorKind::EmptyInput, "no valid transaction records"));
            Vec::new()
        } else {
            self.run_detectors(graph, cancel)?
        };

        let mut truncated_detectors = Vec::new();
        for report in &reports {
            tracing::debug!(
                detector = report.detector,
                matches = report.matches.len(),
                iterations = report.iterations,
                elapsed_ms = report.elapsed.as_millis() as u64,
                truncated = report.truncated,
                "Detector finished"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_detector(report.detector, report.elapsed.as_secs_f64(), report.truncated);
            }
            if report.truncated {
                tracing::warn!("Detector {} truncated after {} iterations", report.detector, report.iterations);
                truncated_detectors.push(report.detector.to_string());
                issues.push(ErrorReport::new(
                    ErrorKind::BudgetExceeded,
                    format!(
                        "{} detector stopped after {} iterations; its matches are partial",
                        report.detector, report.iterations
                    ),
                ));
            }
        }

        let matches: Vec<PatternMatch> = reports.into_iter().flat_map(|r| r.matches).collect();

        // Step 3: Scoring and clustering
        let scores = self.scorer.score(&matches);
        let rings = RingClusterer::new(self.scorer.clone()).cluster(&matches, &scores);
        let elapsed = started.elapsed();

        let metadata = AnalysisMetadata {
            analysis_id,
            records_received: outcome.records_received,
            records_accepted: outcome.records_accepted(),
            records_skipped: outcome.skipped.len(),
            skipped_records: outcome
                .skipped
                .iter()
                .take(self.config.engine.max_skipped_reported)
                .cloned()
                .collect(),
            truncated: !truncated_detectors.is_empty(),
            truncated_detectors,
            issues,
        };

        // Step 4: Assemble
        let result = ResultAggregator::new(self.scorer.clone()).aggregate(
            graph.node_count(),
            &scores,
            rings,
            elapsed,
            metadata,
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_analysis(
                result.metadata.records_skipped,
                result.summary.suspicious_accounts_flagged,
                result.summary.fraud_rings_detected,
                elapsed.as_secs_f64(),
            );
        }

        tracing::info!(
            "Analysis complete: {} matches, {} flagged accounts, {} rings in {:.3}s",
            matches.len(),
            result.summary.suspicious_accounts_flagged,
            result.summary.fraud_rings_detected,
            result.summary.processing_time_seconds
        );

        Ok(result)
    }

    /// Run every detector on the worker pool and collect reports in detector order
    fn run_detectors(&self, graph: &TransactionGraph, cancel: &CancelToken) -> Result<Vec<DetectorReport>> {
        let deadline = Deadline::new(Duration::from_millis(self.config.engine.deadline_ms), cancel.clone());
        let workers = self.config.engine.workers.clamp(1, self.detectors.len().max(1));

        let (job_tx, job_rx) = crossbeam::channel::unbounded::<usize>();
        for index in 0..self.detectors.len() {
            job_tx
                .send(index)
                .map_err(|e| Error::InternalFault(format!("Failed to queue detector: {}", e)))?;
        }
        drop(job_tx);

        let (report_tx, report_rx) = crossbeam::channel::unbounded::<(usize, DetectorReport)>();
        let detectors = &self.detectors;
        let deadline = &deadline;

        let joined = crossbeam::thread::scope(|scope| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let report_tx = report_tx.clone();
                scope.spawn(move |_| {
                    for index in job_rx.iter() {
                        let detector = &detectors[index];
                        let mut budget = deadline.slice(detector.deadline_share(), detector.max_iterations());
                        let started = Instant::now();
                        let matches = detector.detect(graph, &mut budget);
                        let report = DetectorReport {
                            detector: detector.name(),
                            matches,
                            truncated: budget.is_exhausted(),
                            iterations: budget.used(),
                            elapsed: started.elapsed(),
                        };
                        if report_tx.send((index, report)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(report_tx);

        if joined.is_err() {
            tracing::error!("Detector worker panicked");
            return Err(Error::InternalFault("detector worker panicked".to_string()));
        }

        let mut reports: Vec<(usize, DetectorReport)> = report_rx.iter().collect();
        if reports.len() != self.detectors.len() {
            return Err(Error::InternalFault(format!(
                "{} of {} detectors reported",
                reports.len(),
                self.detectors.len()
            )));
        }
        reports.sort_by_key(|(index, _)| *index);

        Ok(reports.into_iter().map(|(_, report)| report).collect())
    }
}

impl std::fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyzer")
            .field("config", &self.config)
            .field("detectors", &self.detectors.iter().map(|d| d.name()).collect::<Vec<_>>())
            .finish()
    }
}

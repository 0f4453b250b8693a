//! Fan-out / fan-in detection
//!
//! Slides a time window over each account's outgoing (fan-out) and incoming
//! (fan-in) edges and counts distinct counterparties. An account that reaches
//! the threshold inside any window is a hub; the window with the most
//! distinct counterparties is reported.

use super::Detector;
use crate::{
    budget::Budget,
    config::{hours_window, FanConfig},
    graph::{EdgeId, NodeId, TransactionGraph},
    scoring::weights,
    types::{PatternMatch, PatternType},
};
use chrono::Duration;
use std::collections::HashMap;

/// Which side of the hub the counterparties sit on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Out,
    In,
}

/// Fan-out / fan-in detector
#[derive(Debug, Clone)]
pub struct FanDetector {
    fan_out_threshold: usize,
    fan_in_threshold: usize,
    window: Duration,
    max_iterations: u64,
    share: f64,
}

impl FanDetector {
    /// Create new fan detector
    pub fn new(config: &FanConfig, share: f64) -> Self {
        Self {
            fan_out_threshold: config.fan_out_threshold,
            fan_in_threshold: config.fan_in_threshold,
            window: hours_window(config.window_hours).unwrap_or(Duration::MAX),
            max_iterations: config.max_iterations,
            share,
        }
    }

    fn scan_hub(
        &self,
        graph: &TransactionGraph,
        hub: NodeId,
        direction: Direction,
        budget: &mut Budget,
    ) -> Option<PatternMatch> {
        let (edges, threshold, pattern_type) = match direction {
            Direction::Out => (graph.outgoing(hub), self.fan_out_threshold, PatternType::FanOut),
            Direction::In => (graph.incoming(hub), self.fan_in_threshold, PatternType::FanIn),
        };

        let counterparty = |edge_id: EdgeId| {
            let edge = graph.edge(edge_id);
            match direction {
                Direction::Out => edge.to,
                Direction::In => edge.from,
            }
        };

        // Cheap reject: not enough counterparties over the whole history
        if edges.len() < threshold {
            return None;
        }

        let mut counts: HashMap<NodeId, usize> = HashMap::new();
        let mut left = 0;
        let mut best: Option<(usize, usize, usize)> = None; // (distinct, left, right)

        for right in 0..edges.len() {
            if !budget.tick() {
                break;
            }

            let entering = graph.edge(edges[right]);
            if entering.is_self_loop() {
                continue;
            }
            *counts.entry(counterparty(edges[right])).or_insert(0) += 1;

            while entering.timestamp - graph.edge(edges[left]).timestamp > self.window {
                let leaving = edges[left];
                left += 1;
                if graph.edge(leaving).is_self_loop() {
                    continue;
                }
                let key = counterparty(leaving);
                if let Some(count) = counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&key);
                    }
                }
            }

            let distinct = counts.len();
            if best.map_or(true, |(d, _, _)| distinct > d) {
                best = Some((distinct, left, right));
            }
        }

        let (distinct, left, right) = best?;
        if distinct < threshold {
            return None;
        }

        let window_edges: Vec<EdgeId> = edges[left..=right]
            .iter()
            .copied()
            .filter(|&e| !graph.edge(e).is_self_loop())
            .collect();
        let amounts: Vec<f64> = window_edges.iter().map(|&e| graph.edge(e).amount_f64()).collect();

        let mut counterparties: Vec<NodeId> = window_edges.iter().map(|&e| counterparty(e)).collect();
        counterparties.sort_unstable();
        counterparties.dedup();

        let severity = weights::fan_severity(distinct, threshold, weights::amount_uniformity(&amounts));

        tracing::trace!(
            hub = %graph.account(hub),
            pattern = %pattern_type,
            distinct,
            severity,
            "Fan hub found"
        );

        Some(PatternMatch {
            pattern_type,
            accounts: std::iter::once(hub)
                .chain(counterparties)
                .map(|n| graph.account(n).clone())
                .collect(),
            severity,
            edges: window_edges,
        })
    }
}

impl Detector for FanDetector {
    fn name(&self) -> &'static str {
        "fan"
    }

    fn deadline_share(&self) -> f64 {
        self.share
    }

    fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    fn detect(&self, graph: &TransactionGraph, budget: &mut Budget) -> Vec<PatternMatch> {
        let mut matches = Vec::new();

        for hub in graph.nodes() {
            for direction in [Direction::Out, Direction::In] {
                if let Some(found) = self.scan_hub(graph, hub, direction, budget) {
                    matches.push(found);
                }
            }
            if budget.is_exhausted() {
                break;
            }
        }

        matches
    }
}

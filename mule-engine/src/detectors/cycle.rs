//! Temporal cycle detection
//!
//! A cycle only counts when money actually travelled forward in time and
//! came back to its origin within the look-back window:
//!
//! ```text
//! A --(t1)--> B --(t2)--> C --(t3)--> A      t1 <= t2 <= t3, t3 - t1 <= W
//! ```
//!
//! # Algorithm
//!
//! Bounded-depth DFS from every node, lowest id first. Each step only follows
//! edges at or after the previous edge's timestamp, and branches are pruned
//! once the elapsed time leaves the window or the hop limit is reached. When
//! several parallel edges lead to the same intermediate neighbour, only the
//! earliest eligible one is followed: it admits every continuation a later
//! one would. Closing edges back to the origin are all tried, since the
//! closing amount decides retention.
//!
//! Rotations of one cycle collapse onto a canonical key (node sequence
//! rotated to start at its smallest node); per key the strongest edge
//! realization is kept.

use super::Detector;
use crate::{
    budget::Budget,
    config::{hours_window, CycleConfig},
    graph::{EdgeId, NodeId, TransactionGraph},
    scoring::weights,
    types::{PatternMatch, PatternType},
};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};

/// Temporal cycle detector
#[derive(Debug, Clone)]
pub struct CycleDetector {
    max_hops: usize,
    min_hops: usize,
    window: Duration,
    max_iterations: u64,
    share: f64,
}

impl CycleDetector {
    /// Create new cycle detector
    pub fn new(config: &CycleConfig, share: f64) -> Self {
        Self {
            max_hops: config.max_hops,
            min_hops: config.min_hops,
            window: hours_window(config.window_hours).unwrap_or(Duration::MAX),
            max_iterations: config.max_iterations,
            share,
        }
    }
}

impl Detector for CycleDetector {
    fn name(&self) -> &'static str {
        "cycle"
    }

    fn deadline_share(&self) -> f64 {
        self.share
    }

    fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    fn detect(&self, graph: &TransactionGraph, budget: &mut Budget) -> Vec<PatternMatch> {
        let mut search = CycleSearch {
            graph,
            detector: self,
            start: 0,
            first_ts: DateTime::<Utc>::MIN_UTC,
            nodes: Vec::with_capacity(self.max_hops),
            edges: Vec::with_capacity(self.max_hops),
            on_path: vec![false; graph.node_count()],
            found: BTreeMap::new(),
        };

        for start in graph.nodes() {
            if !budget.tick() {
                break;
            }
            search.run_from(start, budget);
            if budget.is_exhausted() {
                break;
            }
        }

        search
            .found
            .into_values()
            .map(|cycle| PatternMatch {
                pattern_type: PatternType::Cycle,
                accounts: cycle.nodes.iter().map(|&n| graph.account(n).clone()).collect(),
                severity: cycle.severity,
                edges: cycle.edges,
            })
            .collect()
    }
}

/// Best realization found for one canonical cycle
#[derive(Debug, Clone)]
struct CycleCandidate {
    /// Nodes in flow order, starting at the temporal origin
    nodes: Vec<NodeId>,
    /// Edges in flow order
    edges: Vec<EdgeId>,
    severity: f64,
}

struct CycleSearch<'a> {
    graph: &'a TransactionGraph,
    detector: &'a CycleDetector,
    start: NodeId,
    first_ts: DateTime<Utc>,
    nodes: Vec<NodeId>,
    edges: Vec<EdgeId>,
    on_path: Vec<bool>,
    found: BTreeMap<Vec<NodeId>, CycleCandidate>,
}

impl<'a> CycleSearch<'a> {
    fn run_from(&mut self, start: NodeId, budget: &mut Budget) {
        let graph = self.graph;
        self.start = start;

        // Every outgoing edge may open a cycle: it fixes the window origin
        for &edge_id in graph.outgoing(start) {
            let edge = graph.edge(edge_id);
            if edge.is_self_loop() {
                continue;
            }
            if !budget.tick() {
                break;
            }

            self.first_ts = edge.timestamp;
            self.nodes.push(start);
            self.on_path[start] = true;
            self.edges.push(edge_id);

            self.extend(edge.to, edge.timestamp, budget);

            self.edges.pop();
            self.on_path[start] = false;
            self.nodes.pop();

            if budget.is_exhausted() {
                break;
            }
        }
    }

    /// `node` was just reached through `self.edges.last()`
    fn extend(&mut self, node: NodeId, last_ts: DateTime<Utc>, budget: &mut Budget) {
        let graph = self.graph;
        let hops_so_far = self.edges.len();

        self.nodes.push(node);
        self.on_path[node] = true;

        let outgoing = graph.outgoing(node);
        let begin = outgoing.partition_point(|&e| graph.edge(e).timestamp < last_ts);
        let mut followed: HashSet<NodeId> = HashSet::new();

        for &edge_id in &outgoing[begin..] {
            let edge = graph.edge(edge_id);
            if edge.timestamp - self.first_ts > self.detector.window {
                break;
            }
            let closes = edge.to == self.start;
            if edge.is_self_loop() || (!closes && !followed.insert(edge.to)) {
                continue;
            }
            if !budget.tick() {
                break;
            }

            if closes {
                if hops_so_far + 1 >= self.detector.min_hops {
                    self.record(edge_id);
                }
            } else if !self.on_path[edge.to] && hops_so_far + 1 < self.detector.max_hops {
                self.edges.push(edge_id);
                self.extend(edge.to, edge.timestamp, budget);
                self.edges.pop();
            }

            if budget.is_exhausted() {
                break;
            }
        }

        self.on_path[node] = false;
        self.nodes.pop();
    }

    fn record(&mut self, closing_edge: EdgeId) {
        let graph = self.graph;
        let mut edges = self.edges.clone();
        edges.push(closing_edge);

        let opening = graph.edge(edges[0]).amount_f64();
        let closing = graph.edge(closing_edge).amount_f64();
        let retention = weights::amount_retention(opening, closing);
        let severity = weights::cycle_severity(self.nodes.len(), retention);

        let key = canonical_rotation(&self.nodes);
        let candidate = CycleCandidate {
            nodes: self.nodes.clone(),
            edges,
            severity,
        };

        match self.found.get(&key) {
            Some(existing)
                if existing.severity > candidate.severity
                    || (existing.severity == candidate.severity && existing.edges <= candidate.edges) => {}
            _ => {
                self.found.insert(key, candidate);
            }
        }
    }
}

/// Rotate a node cycle to start at its smallest node
fn canonical_rotation(nodes: &[NodeId]) -> Vec<NodeId> {
    let pivot = nodes
        .iter()
        .enumerate()
        .min_by_key(|(_, n)| **n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    nodes[pivot..].iter().chain(&nodes[..pivot]).copied().collect()
}

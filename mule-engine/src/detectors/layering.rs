//! Layering (pass-through chain) detection
//!
//! An account that receives an amount and forwards a closely matching amount
//! shortly afterwards is a pass-through hop. Hops are linked edge to edge
//! into chains:
//!
//! ```text
//! A --1000--> B --980--> C --965--> D      two pass-through hops (B, C)
//! ```
//!
//! Every incoming edge is paired with at most one outgoing edge and every
//! outgoing edge is consumed at most once, so each edge has at most one
//! successor and one predecessor. Chains are read off from their heads and
//! end before any edge that would return funds to the chain's origin; that
//! returning edge then heads a chain of its own.

use super::Detector;
use crate::{
    budget::Budget,
    config::{hours_window, LayeringConfig},
    graph::{EdgeId, TransactionGraph},
    scoring::weights,
    types::{PatternMatch, PatternType},
};
use chrono::Duration;

/// Slack for float comparison at the exact tolerance boundary
const TOLERANCE_SLACK: f64 = 1e-9;

/// Pass-through chain detector
#[derive(Debug, Clone)]
pub struct LayeringDetector {
    amount_tolerance: f64,
    max_delay: Duration,
    min_passthrough_hops: usize,
    max_iterations: u64,
    share: f64,
}

impl LayeringDetector {
    /// Create new layering detector
    pub fn new(config: &LayeringConfig, share: f64) -> Self {
        Self {
            amount_tolerance: config.amount_tolerance,
            max_delay: hours_window(config.max_delay_hours).unwrap_or(Duration::MAX),
            min_passthrough_hops: config.min_passthrough_hops,
            max_iterations: config.max_iterations,
            share,
        }
    }

    /// Link each incoming edge to its best forwarding edge
    ///
    /// Returns `(next, prev)` indexed by edge id.
    fn pair_edges(
        &self,
        graph: &TransactionGraph,
        budget: &mut Budget,
    ) -> (Vec<Option<EdgeId>>, Vec<Option<EdgeId>>) {
        let mut next: Vec<Option<EdgeId>> = vec![None; graph.edge_count()];
        let mut prev: Vec<Option<EdgeId>> = vec![None; graph.edge_count()];

        'nodes: for node in graph.nodes() {
            let outgoing = graph.outgoing(node);

            for &in_id in graph.incoming(node) {
                let incoming = graph.edge(in_id);
                if incoming.is_self_loop() {
                    continue;
                }
                if !budget.tick() {
                    break 'nodes;
                }

                let in_amount = incoming.amount_f64();
                let allowed = self.amount_tolerance * in_amount + TOLERANCE_SLACK;
                let begin = outgoing.partition_point(|&e| graph.edge(e).timestamp < incoming.timestamp);

                // Scanned chronologically: a strict improvement keeps the earliest on ties
                let mut best: Option<(f64, EdgeId)> = None;
                for &out_id in &outgoing[begin..] {
                    let candidate = graph.edge(out_id);
                    if candidate.timestamp - incoming.timestamp > self.max_delay {
                        break;
                    }
                    if !budget.tick() {
                        break 'nodes;
                    }
                    if candidate.is_self_loop() || candidate.to == incoming.from || prev[out_id].is_some() {
                        continue;
                    }

                    let diff = (candidate.amount_f64() - in_amount).abs();
                    if diff > allowed {
                        continue;
                    }
                    if best.map_or(true, |(best_diff, _)| diff < best_diff) {
                        best = Some((diff, out_id));
                    }
                }

                if let Some((_, out_id)) = best {
                    next[in_id] = Some(out_id);
                    prev[out_id] = Some(in_id);
                }
            }
        }

        (next, prev)
    }

    /// Match for a linked chain, if it has enough pass-through hops
    fn chain_match(&self, graph: &TransactionGraph, chain: Vec<EdgeId>) -> Option<PatternMatch> {
        let hops = chain.len() - 1;
        if hops < self.min_passthrough_hops {
            return None;
        }

        let first = graph.edge(chain[0]);
        let last = graph.edge(chain[hops]);
        let leakage = if first.amount_f64() > 0.0 {
            (1.0 - last.amount_f64() / first.amount_f64()).max(0.0)
        } else {
            0.0
        };

        let accounts = std::iter::once(first.from)
            .chain(chain.iter().map(|&e| graph.edge(e).to))
            .map(|n| graph.account(n).clone())
            .collect();

        Some(PatternMatch {
            pattern_type: PatternType::Layering,
            accounts,
            severity: weights::layering_severity(hops, leakage),
            edges: chain,
        })
    }
}

impl Detector for LayeringDetector {
    fn name(&self) -> &'static str {
        "layering"
    }

    fn deadline_share(&self) -> f64 {
        self.share
    }

    fn max_iterations(&self) -> u64 {
        self.max_iterations
    }

    fn detect(&self, graph: &TransactionGraph, budget: &mut Budget) -> Vec<PatternMatch> {
        let (next, prev) = self.pair_edges(graph, budget);
        let mut matches = Vec::new();

        for head in 0..graph.edge_count() {
            if prev[head].is_some() || next[head].is_none() {
                continue;
            }

            // A chain returning to its origin is a cycle, not layering: cut it
            // there and carry on with the returning edge as a new head
            let mut segment = Some(head);
            while let Some(start) = segment.take() {
                let origin = graph.edge(start).from;
                let mut chain = vec![start];
                let mut cursor = start;
                while let Some(following) = next[cursor] {
                    if graph.edge(following).to == origin {
                        segment = Some(following);
                        break;
                    }
                    chain.push(following);
                    cursor = following;
                }

                if let Some(found) = self.chain_match(graph, chain) {
                    matches.push(found);
                }
            }
        }

        matches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::types::TransactionRow;

    fn row(id: &str, from: &str, to: &str, amount: &str, ts: &str) -> TransactionRow {
        TransactionRow::new(id, from, to, amount, ts)
    }

    fn detect(rows: &[TransactionRow]) -> Vec<PatternMatch> {
        let graph = GraphBuilder::build(rows).graph;
        LayeringDetector::new(&LayeringConfig::default(), 1.0).detect(&graph, &mut Budget::unlimited())
    }

    #[test]
    fn test_three_edge_chain() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "960", "2024-01-01 10:20:00"),
            row("T3", "C", "D", "950", "2024-01-01 10:40:00"),
        ];

        let matches = detect(&rows);

        assert_eq!(matches.len(), 1);
        let m = &matches[0];
        assert_eq!(m.pattern_type, PatternType::Layering);
        assert_eq!(m.edges.len(), 3);
        let accounts: Vec<&str> = m.accounts.iter().map(|a| a.as_str()).collect();
        assert_eq!(accounts, vec!["A", "B", "C", "D"]);
        let expected = weights::layering_severity(2, 0.05);
        assert!((m.severity - expected).abs() < 1e-9);
    }

    #[test]
    fn test_broken_tolerance_no_match() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "800", "2024-01-01 10:20:00"),
            row("T3", "C", "D", "790", "2024-01-01 10:40:00"),
        ];

        assert!(detect(&rows).is_empty());
    }

    #[test]
    fn test_tolerance_boundary_inclusive() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "950", "2024-01-01 10:20:00"),
            row("T3", "C", "D", "997.50", "2024-01-01 10:40:00"),
        ];

        assert_eq!(detect(&rows).len(), 1);
    }

    #[test]
    fn test_single_hop_is_not_layering() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-01 10:20:00"),
        ];

        assert!(detect(&rows).is_empty());
    }

    #[test]
    fn test_delay_and_order_enforced() {
        // Forwarding before receiving, and forwarding too late
        let early = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-01 09:00:00"),
            row("T3", "C", "D", "985", "2024-01-01 11:00:00"),
        ];
        assert!(detect(&early).is_empty());

        let late = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-04 10:00:00"),
            row("T3", "C", "D", "985", "2024-01-04 11:00:00"),
        ];
        assert!(detect(&late).is_empty());
    }

    #[test]
    fn test_bounce_back_not_paired() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "A", "1000", "2024-01-01 10:10:00"),
            row("T3", "A", "C", "1000", "2024-01-01 10:20:00"),
        ];

        assert!(detect(&rows).is_empty());
    }

    #[test]
    fn test_round_trip_is_cut_at_origin() {
        let cycle = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-01 10:20:00"),
            row("T3", "C", "A", "980", "2024-01-01 10:40:00"),
        ];
        assert!(detect(&cycle).is_empty());

        let longer = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-01 10:20:00"),
            row("T3", "C", "D", "980", "2024-01-01 10:40:00"),
            row("T4", "D", "A", "975", "2024-01-01 11:00:00"),
        ];
        let matches = detect(&longer);
        assert_eq!(matches.len(), 1);
        let accounts: Vec<&str> = matches[0].accounts.iter().map(|a| a.as_str()).collect();
        assert_eq!(accounts, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_hops_after_return_to_origin_kept() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "B", "C", "990", "2024-01-01 10:20:00"),
            row("T3", "C", "A", "980", "2024-01-01 10:40:00"),
            row("T4", "A", "D", "970", "2024-01-01 11:00:00"),
            row("T5", "D", "E", "960", "2024-01-01 11:20:00"),
        ];

        let matches = detect(&rows);

        // A -> B -> C is cut before returning to A; C's transfer onwards stands alone
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].edges, vec![2, 3, 4]);
        let accounts: Vec<&str> = matches[0].accounts.iter().map(|a| a.as_str()).collect();
        assert_eq!(accounts, vec!["C", "A", "D", "E"]);
        let expected = weights::layering_severity(2, 1.0 - 960.0 / 980.0);
        assert!((matches[0].severity - expected).abs() < 1e-9);
    }

    #[test]
    fn test_closest_amount_wins_and_outgoing_consumed_once() {
        let rows = vec![
            row("T1", "A", "B", "1000", "2024-01-01 10:00:00"),
            row("T2", "X", "B", "1000", "2024-01-01 10:05:00"),
            row("T3", "B", "C", "970", "2024-01-01 10:10:00"),
            row("T4", "B", "E", "999", "2024-01-01 10:15:00"),
            row("T5", "C", "D", "965", "2024-01-01 10:30:00"),
            row("T6", "E", "F", "995", "2024-01-01 10:30:00"),
        ];

        let mut matches = detect(&rows);
        matches.sort_by(|a, b| a.edges.cmp(&b.edges));

        assert_eq!(matches.len(), 2);
        let paths: Vec<Vec<&str>> = matches
            .iter()
            .map(|m| m.accounts.iter().map(|a| a.as_str()).collect())
            .collect();
        // A's transfer takes the closer 999, X's gets the remaining 970
        assert!(paths.contains(&vec!["A", "B", "E", "F"]));
        assert!(paths.contains(&vec!["X", "B", "C", "D"]));
    }
}

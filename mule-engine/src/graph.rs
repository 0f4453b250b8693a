//! Transaction graph and its builder
//!
//! The graph is a directed multigraph: one node per distinct account, one
//! edge per admitted transaction. It is assembled once by [`GraphBuilder`]
//! and exposes only `&self` accessors afterwards, so detectors can share a
//! plain reference across threads.
//!
//! # Layout
//!
//! - Node ids follow ascending lexical order of account ids
//! - Edge ids follow chronological order (ties: transaction id, then input order)
//! - Per-node outgoing/incoming lists are therefore sorted by timestamp

use crate::{
    types::{AccountId, SkipReason, SkippedRecord, TransactionRecord, TransactionRow},
    Error, Result,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::Range;
use std::str::FromStr;

/// Index of a node (account)
pub type NodeId = usize;

/// Index of an edge (transaction)
pub type EdgeId = usize;

const NAIVE_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Directed edge carrying one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// Source transaction ID
    pub transaction_id: String,

    /// Sender node
    pub from: NodeId,

    /// Receiver node
    pub to: NodeId,

    /// Amount
    pub amount: Decimal,

    /// Transfer instant
    pub timestamp: DateTime<Utc>,
}

impl Edge {
    /// Sender and receiver are the same account
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }

    /// Amount as a float, for weighting math
    pub fn amount_f64(&self) -> f64 {
        self.amount.to_f64().unwrap_or(0.0)
    }
}

/// Frozen transaction graph
#[derive(Debug)]
pub struct TransactionGraph {
    accounts: Vec<AccountId>,
    index: HashMap<AccountId, NodeId>,
    edges: Vec<Edge>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
}

impl TransactionGraph {
    /// Number of accounts
    pub fn node_count(&self) -> usize {
        self.accounts.len()
    }

    /// Number of transactions
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// No transactions admitted
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// All node ids, lowest first
    pub fn nodes(&self) -> Range<NodeId> {
        0..self.accounts.len()
    }

    /// Account behind a node
    pub fn account(&self, node: NodeId) -> &AccountId {
        &self.accounts[node]
    }

    /// Node for an account id
    pub fn node_id(&self, account: &str) -> Option<NodeId> {
        self.index.get(&AccountId::new(account)).copied()
    }

    /// Edge by id
    pub fn edge(&self, edge: EdgeId) -> &Edge {
        &self.edges[edge]
    }

    /// All edges in id order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of a node, sorted by timestamp
    pub fn outgoing(&self, node: NodeId) -> &[EdgeId] {
        &self.outgoing[node]
    }

    /// Incoming edges of a node, sorted by timestamp
    pub fn incoming(&self, node: NodeId) -> &[EdgeId] {
        &self.incoming[node]
    }

    /// Check structural invariants
    ///
    /// Every edge must reference existing nodes and appear exactly once in
    /// its endpoints' adjacency lists.
    pub fn verify(&self) -> Result<()> {
        let n = self.accounts.len();
        if self.outgoing.len() != n || self.incoming.len() != n || self.index.len() != n {
            return Err(Error::InternalFault(format!(
                "adjacency tables sized {}/{}/{} for {} nodes",
                self.outgoing.len(),
                self.incoming.len(),
                self.index.len(),
                n
            )));
        }

        for (id, edge) in self.edges.iter().enumerate() {
            if edge.from >= n || edge.to >= n {
                return Err(Error::InternalFault(format!(
                    "edge {} ({}) references node outside 0..{}",
                    id, edge.transaction_id, n
                )));
            }
        }

        let listed_out: usize = self.outgoing.iter().map(Vec::len).sum();
        let listed_in: usize = self.incoming.iter().map(Vec::len).sum();
        if listed_out != self.edges.len() || listed_in != self.edges.len() {
            return Err(Error::InternalFault(format!(
                "adjacency lists hold {} out / {} in entries for {} edges",
                listed_out,
                listed_in,
                self.edges.len()
            )));
        }

        Ok(())
    }
}

/// Graph plus the accounting of what was admitted
#[derive(Debug)]
pub struct BuildOutcome {
    /// Frozen graph
    pub graph: TransactionGraph,

    /// Rows handed in
    pub records_received: usize,

    /// Rows skipped, in input order
    pub skipped: Vec<SkippedRecord>,
}

impl BuildOutcome {
    /// Rows admitted
    pub fn records_accepted(&self) -> usize {
        self.records_received - self.skipped.len()
    }
}

/// Turns rows into a frozen [`TransactionGraph`]
#[derive(Debug, Default, Clone, Copy)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Validate and admit rows; malformed rows are skipped and reported
    pub fn build(rows: &[TransactionRow]) -> BuildOutcome {
        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = Vec::new();
        let mut seen_ids: HashSet<&str> = HashSet::with_capacity(rows.len());

        for (index, row) in rows.iter().enumerate() {
            let outcome = Self::validate_row(row).and_then(|record| {
                if seen_ids.insert(row.transaction_id.trim()) {
                    Ok(record)
                } else {
                    Err(SkipReason::DuplicateTransaction)
                }
            });

            match outcome {
                Ok(record) => records.push(record),
                Err(reason) => {
                    tracing::debug!(index, transaction_id = %row.transaction_id, %reason, "Skipping row");
                    let id = row.transaction_id.trim();
                    skipped.push(SkippedRecord {
                        index,
                        transaction_id: (!id.is_empty()).then(|| id.to_string()),
                        reason,
                    });
                }
            }
        }

        BuildOutcome {
            graph: Self::from_records(records),
            records_received: rows.len(),
            skipped,
        }
    }

    /// Validate a single row
    pub fn validate_row(row: &TransactionRow) -> std::result::Result<TransactionRecord, SkipReason> {
        let id = row.transaction_id.trim();
        let sender = row.sender_id.trim();
        let receiver = row.receiver_id.trim();
        if id.is_empty() || sender.is_empty() || receiver.is_empty() {
            return Err(SkipReason::MissingField);
        }

        let amount = parse_amount(&row.amount).ok_or(SkipReason::InvalidAmount)?;
        if amount <= Decimal::ZERO {
            return Err(SkipReason::NonPositiveAmount);
        }

        let timestamp = parse_timestamp(&row.timestamp).ok_or(SkipReason::InvalidTimestamp)?;

        Ok(TransactionRecord {
            id: id.to_string(),
            sender: AccountId::new(sender),
            receiver: AccountId::new(receiver),
            amount,
            timestamp,
        })
    }

    /// Assemble a graph from already validated records
    pub fn from_records(records: Vec<TransactionRecord>) -> TransactionGraph {
        let accounts: Vec<AccountId> = records
            .iter()
            .flat_map(|r| [r.sender.clone(), r.receiver.clone()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<AccountId, NodeId> = accounts
            .iter()
            .enumerate()
            .map(|(node, account)| (account.clone(), node))
            .collect();

        // Chronological edge ids; input order breaks remaining ties
        let mut ordered: Vec<(usize, TransactionRecord)> = records.into_iter().enumerate().collect();
        ordered.sort_by(|(ia, a), (ib, b)| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
                .then_with(|| ia.cmp(ib))
        });

        let mut edges = Vec::with_capacity(ordered.len());
        let mut outgoing = vec![Vec::new(); accounts.len()];
        let mut incoming = vec![Vec::new(); accounts.len()];

        for (edge_id, (_, record)) in ordered.into_iter().enumerate() {
            let from = index[&record.sender];
            let to = index[&record.receiver];
            outgoing[from].push(edge_id);
            incoming[to].push(edge_id);
            edges.push(Edge {
                transaction_id: record.id,
                from,
                to,
                amount: record.amount,
                timestamp: record.timestamp,
            });
        }

        TransactionGraph {
            accounts,
            index,
            edges,
            outgoing,
            incoming,
        }
    }
}

/// Parse a decimal amount, accepting plain and scientific notation
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Parse a timestamp; naive forms are read as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, from: &str, to: &str, amount: &str, ts: &str) -> TransactionRow {
        TransactionRow::new(id, from, to, amount, ts)
    }

    #[test]
    fn test_build_node_set_and_order() {
        let rows = vec![
            row("T2", "ZED", "AMY", "50", "2024-01-01 12:00:00"),
            row("T1", "AMY", "BOB", "100", "2024-01-01 10:00:00"),
            row("T3", "AMY", "BOB", "75.5", "2024-01-01 11:00:00"),
        ];

        let outcome = GraphBuilder::build(&rows);
        let graph = &outcome.graph;

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.account(0).as_str(), "AMY");
        assert_eq!(graph.account(2).as_str(), "ZED");

        // Edge ids are chronological
        assert_eq!(graph.edge(0).transaction_id, "T1");
        assert_eq!(graph.edge(1).transaction_id, "T3");
        assert_eq!(graph.edge(2).transaction_id, "T2");

        // Parallel edges kept, sorted by time
        let amy = graph.node_id("AMY").unwrap();
        assert_eq!(graph.outgoing(amy), &[0, 1]);
        assert_eq!(graph.incoming(amy), &[2]);
        assert!(graph.verify().is_ok());
    }

    #[test]
    fn test_invalid_rows_are_skipped_and_counted() {
        let rows = vec![
            row("T1", "A", "B", "100", "2024-01-01 10:00:00"),
            row("T2", "", "B", "100", "2024-01-01 10:00:00"),
            row("T3", "A", "B", "abc", "2024-01-01 10:00:00"),
            row("T4", "A", "B", "-5", "2024-01-01 10:00:00"),
            row("T5", "A", "B", "0", "2024-01-01 10:00:00"),
            row("T6", "A", "B", "10", "yesterday"),
            row("T1", "A", "C", "10", "2024-01-01 11:00:00"),
            row("  ", "A", "C", "10", "2024-01-01 11:00:00"),
        ];

        let outcome = GraphBuilder::build(&rows);

        assert_eq!(outcome.records_received, 8);
        assert_eq!(outcome.records_accepted(), 1);
        let reasons: Vec<SkipReason> = outcome.skipped.iter().map(|s| s.reason).collect();
        assert_eq!(
            reasons,
            vec![
                SkipReason::MissingField,
                SkipReason::InvalidAmount,
                SkipReason::NonPositiveAmount,
                SkipReason::NonPositiveAmount,
                SkipReason::InvalidTimestamp,
                SkipReason::DuplicateTransaction,
                SkipReason::MissingField,
            ]
        );
        assert_eq!(outcome.skipped[0].index, 1);
        assert_eq!(outcome.skipped[6].transaction_id, None);

        // C only appears in a rejected row
        assert_eq!(outcome.graph.node_count(), 2);
        assert!(outcome.graph.node_id("C").is_none());
    }

    #[test]
    fn test_self_loop_kept() {
        let rows = vec![row("T1", "A", "A", "10", "2024-01-01 10:00:00")];
        let outcome = GraphBuilder::build(&rows);

        assert_eq!(outcome.graph.node_count(), 1);
        assert!(outcome.graph.edge(0).is_self_loop());
        assert!(outcome.graph.verify().is_ok());
    }

    #[test]
    fn test_empty_input() {
        let outcome = GraphBuilder::build(&[]);
        assert!(outcome.graph.is_empty());
        assert_eq!(outcome.graph.node_count(), 0);
        assert!(outcome.graph.verify().is_ok());
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(14, 30, 0)
            .unwrap()
            .and_utc();

        for raw in [
            "2024-03-05 14:30:00",
            "2024-03-05T14:30:00",
            "2024-03-05T14:30:00Z",
            "2024-03-05T16:30:00+02:00",
            "2024-03-05 14:30",
            " 2024-03-05 14:30:00.000 ",
        ] {
            assert_eq!(parse_timestamp(raw), Some(expected), "format {:?}", raw);
        }

        assert!(parse_timestamp("2024-03-05").is_some());
        assert!(parse_timestamp("05/03/2024").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_amount_formats() {
        assert_eq!(parse_amount("1500.25"), Some(Decimal::new(150025, 2)));
        assert_eq!(parse_amount(" 42 "), Some(Decimal::from(42)));
        assert_eq!(parse_amount("1.5e3"), Some(Decimal::from(1500)));
        assert_eq!(parse_amount("twelve"), None);
    }
}

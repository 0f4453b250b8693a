//! Property-based tests for engine invariants
//!
//! These tests use proptest to verify:
//! - Node count: every distinct account in an accepted row is a node
//! - Monotonic scores: adding a match never lowers an account's score
//! - Determinism: same rows → same rings and account ordering
//! - Consistency: every flagged account sits in exactly one emitted ring

use chrono::{Duration, NaiveDate};
use mule_engine::{
    scoring::{weights, SuspicionScorer},
    AccountId, Analyzer, Config, GraphBuilder, PatternMatch, PatternType, TransactionRow,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

/// Strategy for account ids from a small pool, so patterns actually form
fn account_strategy() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("ACC_{:02}", n))
}

/// Strategy for valid rows within a three-day span
fn row_strategy() -> impl Strategy<Value = (String, String, u64, i64)> {
    (
        account_strategy(),
        account_strategy(),
        1u64..1_000_000u64,
        0i64..(3 * 24 * 60),
    )
}

fn to_rows(raw: Vec<(String, String, u64, i64)>) -> Vec<TransactionRow> {
    let base = NaiveDate::from_ymd_opt(2024, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    raw.into_iter()
        .enumerate()
        .map(|(i, (sender, receiver, cents, minutes))| {
            let ts = base + Duration::minutes(minutes);
            TransactionRow::new(
                format!("TX{:05}", i),
                sender,
                receiver,
                format!("{}.{:02}", cents / 100, cents % 100),
                ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            )
        })
        .collect()
}

/// Strategy for pattern types
fn pattern_type_strategy() -> impl Strategy<Value = PatternType> {
    prop_oneof![
        Just(PatternType::Cycle),
        Just(PatternType::Layering),
        Just(PatternType::FanIn),
        Just(PatternType::FanOut),
    ]
}

/// Strategy for matches that all include the account "TARGET"
fn match_strategy() -> impl Strategy<Value = PatternMatch> {
    (pattern_type_strategy(), 0.0f64..=1.0, prop::collection::vec(account_strategy(), 1..4)).prop_map(
        |(pattern_type, severity, others)| {
            let mut accounts = vec![AccountId::new("TARGET")];
            accounts.extend(others.into_iter().map(AccountId::new));
            PatternMatch {
                pattern_type,
                accounts,
                severity,
                edges: Vec::new(),
            }
        },
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: node set = union of senders and receivers
    #[test]
    fn prop_node_count_matches_distinct_accounts(raw in prop::collection::vec(row_strategy(), 0..60)) {
        let rows = to_rows(raw);
        let expected: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| [r.sender_id.as_str(), r.receiver_id.as_str()])
            .collect();

        let outcome = GraphBuilder::build(&rows);

        prop_assert_eq!(outcome.graph.node_count(), expected.len());
        prop_assert_eq!(outcome.graph.edge_count(), rows.len());
        prop_assert!(outcome.graph.verify().is_ok());
    }

    /// Property: noisy-OR never decreases when a weight is added
    #[test]
    fn prop_noisy_or_monotonic(
        base in prop::collection::vec(0.0f64..=1.0, 0..10),
        extra in 0.0f64..=1.0,
    ) {
        let before = weights::noisy_or(base.clone());
        let mut extended = base;
        extended.push(extra);
        let after = weights::noisy_or(extended);

        prop_assert!(after + 1e-9 >= before);
        prop_assert!((0.0..=100.0).contains(&after));
    }

    /// Property: an extra match never lowers the scorer's output for an account
    #[test]
    fn prop_score_monotonic_in_matches(
        matches in prop::collection::vec(match_strategy(), 0..8),
        extra in match_strategy(),
    ) {
        let scorer = SuspicionScorer::default();
        let target = AccountId::new("TARGET");

        let before = scorer
            .score(&matches)
            .get(&target)
            .map(|s| s.score)
            .unwrap_or(0.0);

        let mut extended = matches;
        extended.push(extra);
        let after = scorer.score(&extended)[&target].score;

        prop_assert!(after + 1e-9 >= before);
    }

    /// Property: repeated analysis gives identical rings and account ordering
    #[test]
    fn prop_deterministic_output(raw in prop::collection::vec(row_strategy(), 0..80)) {
        let rows = to_rows(raw);
        let analyzer = Analyzer::new(Config::default()).unwrap();

        let first = analyzer.analyze(&rows).unwrap();
        let second = analyzer.analyze(&rows).unwrap();

        prop_assert_eq!(
            serde_json::to_string(&first.fraud_rings).unwrap(),
            serde_json::to_string(&second.fraud_rings).unwrap()
        );
        prop_assert_eq!(
            serde_json::to_string(&first.suspicious_accounts).unwrap(),
            serde_json::to_string(&second.suspicious_accounts).unwrap()
        );
        prop_assert_eq!(first.summary.total_accounts_analyzed, second.summary.total_accounts_analyzed);
    }

    /// Property: flagged accounts belong to exactly one emitted ring
    #[test]
    fn prop_flagged_accounts_in_one_ring(raw in prop::collection::vec(row_strategy(), 0..80)) {
        let rows = to_rows(raw);
        let result = Analyzer::new(Config::default()).unwrap().analyze(&rows).unwrap();

        for account in &result.suspicious_accounts {
            prop_assert!(account.suspicion_score >= 50.0);
            prop_assert!(account.suspicion_score <= 100.0);
            let containing: Vec<&str> = result
                .fraud_rings
                .iter()
                .filter(|r| r.member_accounts.contains(&account.account_id))
                .map(|r| r.ring_id.as_str())
                .collect();
            prop_assert_eq!(containing, vec![account.ring_id.as_str()]);
        }
        prop_assert_eq!(result.summary.fraud_rings_detected, result.fraud_rings.len());
    }
}

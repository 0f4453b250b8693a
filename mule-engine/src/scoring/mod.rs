//! Suspicion scoring
//!
//! Folds every pattern match an account takes part in into a single
//! `[0, 100]` score with a noisy-OR: one strong match can dominate, further
//! weak matches add with diminishing effect and never lower the score.

pub mod weights;

use crate::types::{AccountId, PatternMatch, SuspicionScore};
use std::collections::{BTreeMap, BTreeSet};

/// Per-account suspicion scorer
#[derive(Debug, Clone)]
pub struct SuspicionScorer {
    flag_threshold: f64,
}

impl SuspicionScorer {
    /// Create new scorer
    pub fn new(flag_threshold: f64) -> Self {
        Self { flag_threshold }
    }

    /// Score every account that appears in at least one match
    ///
    /// An account listed twice in one match (e.g. a layering path passing
    /// through it again) still counts that match once.
    pub fn score(&self, matches: &[PatternMatch]) -> BTreeMap<AccountId, SuspicionScore> {
        let mut severities: BTreeMap<&AccountId, (Vec<f64>, BTreeSet<_>)> = BTreeMap::new();

        for m in matches {
            for account in m.distinct_accounts() {
                let (weights, patterns) = severities.entry(account).or_default();
                weights.push(m.severity);
                patterns.insert(m.pattern_type);
            }
        }

        severities
            .into_iter()
            .map(|(account, (severity_list, patterns))| {
                let score = SuspicionScore {
                    account_id: account.clone(),
                    score: weights::noisy_or(severity_list),
                    patterns,
                };
                (account.clone(), score)
            })
            .collect()
    }

    /// Whether a score reaches the flag threshold
    pub fn is_flagged(&self, score: f64) -> bool {
        score >= self.flag_threshold
    }

    /// Flag threshold
    pub fn flag_threshold(&self) -> f64 {
        self.flag_threshold
    }
}

/// Round a score to the two decimals emitted in results
pub fn round_score(score: f64) -> f64 {
    (score * 100.0).round() / 100.0
}

impl Default for SuspicionScorer {
    fn default() -> Self {
        Self::new(50.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PatternType;

    fn pattern(pattern_type: PatternType, accounts: &[&str], severity: f64) -> PatternMatch {
        PatternMatch {
            pattern_type,
            accounts: accounts.iter().map(|a| AccountId::new(*a)).collect(),
            severity,
            edges: Vec::new(),
        }
    }

    #[test]
    fn test_single_strong_match_dominates() {
        let scorer = SuspicionScorer::default();
        let scores = scorer.score(&[pattern(PatternType::Cycle, &["A", "B", "C"], 0.99)]);

        assert_eq!(scores.len(), 3);
        let a = &scores[&AccountId::new("A")];
        assert!((a.score - 99.0).abs() < 1e-9);
        assert!(scorer.is_flagged(a.score));
        assert_eq!(a.patterns.iter().copied().collect::<Vec<_>>(), vec![PatternType::Cycle]);
    }

    #[test]
    fn test_combination_and_pattern_set() {
        let scorer = SuspicionScorer::default();
        let scores = scorer.score(&[
            pattern(PatternType::FanOut, &["HUB", "R1", "R2"], 0.4),
            pattern(PatternType::Layering, &["X", "HUB", "Y", "Z"], 0.4),
        ]);

        let hub = &scores[&AccountId::new("HUB")];
        assert!((hub.score - 64.0).abs() < 1e-9);
        assert!(hub.patterns.contains(&PatternType::FanOut));
        assert!(hub.patterns.contains(&PatternType::Layering));

        let r1 = &scores[&AccountId::new("R1")];
        assert!((r1.score - 40.0).abs() < 1e-9);
        assert!(!scorer.is_flagged(r1.score));
    }

    #[test]
    fn test_repeated_account_counts_once_per_match() {
        let scorer = SuspicionScorer::default();
        let scores = scorer.score(&[pattern(PatternType::Layering, &["A", "B", "A", "C"], 0.5)]);

        assert!((scores[&AccountId::new("A")].score - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(66.4999), 66.5);
        assert_eq!(round_score(99.0), 99.0);
        assert_eq!(round_score(12.344), 12.34);
    }

    #[test]
    fn test_no_matches_no_scores() {
        assert!(SuspicionScorer::default().score(&[]).is_empty());
    }
}

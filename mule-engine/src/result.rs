//! Result assembly

use crate::{
    scoring::{round_score, SuspicionScorer},
    types::{AccountId, AnalysisMetadata, AnalysisResult, FraudRing, SuspicionScore, SuspiciousAccount, Summary},
};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Builds the final ordered payload
#[derive(Debug, Clone)]
pub struct ResultAggregator {
    scorer: SuspicionScorer,
}

impl ResultAggregator {
    /// Create new aggregator flagging with `scorer`'s threshold
    pub fn new(scorer: SuspicionScorer) -> Self {
        Self { scorer }
    }

    /// Assemble summary, rings and flagged accounts
    pub fn aggregate(
        &self,
        total_accounts: usize,
        scores: &BTreeMap<AccountId, SuspicionScore>,
        fraud_rings: Vec<FraudRing>,
        processing_time: Duration,
        metadata: AnalysisMetadata,
    ) -> AnalysisResult {
        let ring_of: HashMap<&AccountId, &str> = fraud_rings
            .iter()
            .flat_map(|ring| ring.member_accounts.iter().map(move |a| (a, ring.ring_id.as_str())))
            .collect();

        let mut suspicious_accounts: Vec<SuspiciousAccount> = scores
            .values()
            .filter(|s| self.scorer.is_flagged(s.score))
            .map(|s| SuspiciousAccount {
                account_id: s.account_id.clone(),
                suspicion_score: round_score(s.score),
                detected_patterns: s.patterns.iter().copied().collect(),
                ring_id: ring_of
                    .get(&s.account_id)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            })
            .collect();

        suspicious_accounts.sort_by(|a, b| {
            b.suspicion_score
                .total_cmp(&a.suspicion_score)
                .then_with(|| a.account_id.cmp(&b.account_id))
        });

        let summary = Summary {
            total_accounts_analyzed: total_accounts,
            suspicious_accounts_flagged: suspicious_accounts.len(),
            fraud_rings_detected: fraud_rings.len(),
            processing_time_seconds: (processing_time.as_secs_f64() * 1000.0).round() / 1000.0,
        };

        AnalysisResult {
            summary,
            fraud_rings,
            suspicious_accounts,
            metadata,
        }
    }
}

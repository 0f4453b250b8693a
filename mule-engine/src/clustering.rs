//! Ring clustering
//!
//! Accounts that co-occur in any pattern match are linked; the connected
//! components of that relation (union-find) are candidate rings. A component
//! becomes a [`FraudRing`] only if at least one member is flagged.

use crate::{
    scoring::{round_score, SuspicionScorer},
    types::{AccountId, FraudRing, PatternMatch, PatternType, SuspicionScore},
};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Disjoint-set forest with union by rank and path halving
#[derive(Debug, Clone)]
struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        while self.parent[i] != i {
            self.parent[i] = self.parent[self.parent[i]];
            i = self.parent[i];
        }
        i
    }

    fn union(&mut self, x: usize, y: usize) {
        let px = self.find(x);
        let py = self.find(y);
        if px == py {
            return;
        }

        match self.rank[px].cmp(&self.rank[py]) {
            Ordering::Less => self.parent[px] = py,
            Ordering::Greater => self.parent[py] = px,
            Ordering::Equal => {
                self.parent[py] = px;
                self.rank[px] += 1;
            }
        }
    }
}

/// Component under construction
#[derive(Debug, Default)]
struct Component {
    members: Vec<AccountId>,
    mass: BTreeMap<PatternType, f64>,
    risk_score: f64,
    flagged: bool,
}

impl Component {
    /// Greatest severity mass; ties go to the more severe pattern
    fn dominant_pattern(&self) -> PatternType {
        let mut dominant = PatternType::FanOut;
        let mut best = f64::NEG_INFINITY;
        for pattern in PatternType::ALL {
            if let Some(&mass) = self.mass.get(&pattern) {
                if mass > best {
                    best = mass;
                    dominant = pattern;
                }
            }
        }
        dominant
    }
}

/// Merges overlapping matches into fraud rings
#[derive(Debug, Clone)]
pub struct RingClusterer {
    scorer: SuspicionScorer,
}

impl RingClusterer {
    /// Create new clusterer flagging with `scorer`'s threshold
    pub fn new(scorer: SuspicionScorer) -> Self {
        Self { scorer }
    }

    /// Build rings, ordered and numbered `RING_001`, `RING_002`, ...
    ///
    /// Rings are ordered by risk score (as emitted) descending, then by
    /// smallest member id.
    pub fn cluster(
        &self,
        matches: &[PatternMatch],
        scores: &BTreeMap<AccountId, SuspicionScore>,
    ) -> Vec<FraudRing> {
        let accounts: Vec<&AccountId> = scores.keys().collect();
        let index: HashMap<&AccountId, usize> = accounts.iter().enumerate().map(|(i, &a)| (a, i)).collect();
        let mut sets = DisjointSet::new(accounts.len());

        for m in matches {
            let mut members = m.accounts.iter().filter_map(|a| index.get(a).copied());
            if let Some(first) = members.next() {
                for other in members {
                    sets.union(first, other);
                }
            }
        }

        // Keyed by root; members arrive in account order, so they stay sorted
        let mut components: BTreeMap<usize, Component> = BTreeMap::new();
        for (i, account) in accounts.iter().enumerate() {
            let root = sets.find(i);
            let score = scores[*account].score;
            let component = components.entry(root).or_default();
            component.members.push((*account).clone());
            component.risk_score = component.risk_score.max(score);
            component.flagged |= self.scorer.is_flagged(score);
        }

        for m in matches {
            let Some(&first) = m.accounts.first().and_then(|a| index.get(a)) else {
                continue;
            };
            let root = sets.find(first);
            if let Some(component) = components.get_mut(&root) {
                *component.mass.entry(m.pattern_type).or_insert(0.0) += m.severity;
            }
        }

        let mut rings: Vec<FraudRing> = components
            .into_values()
            .filter(|c| c.flagged)
            .map(|c| FraudRing {
                ring_id: String::new(),
                pattern_type: c.dominant_pattern(),
                risk_score: round_score(c.risk_score),
                member_accounts: c.members,
            })
            .collect();

        rings.sort_by(|a, b| {
            b.risk_score
                .total_cmp(&a.risk_score)
                .then_with(|| a.member_accounts.first().cmp(&b.member_accounts.first()))
        });

        for (i, ring) in rings.iter_mut().enumerate() {
            ring.ring_id = format!("RING_{:03}", i + 1);
        }

        rings
    }
}

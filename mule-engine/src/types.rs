//! Core types for the detection engine

use crate::error::Issue;
use crate::graph::EdgeId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Account identifier
///
/// Accounts carry no state beyond their id; everything derived about an
/// account lives in the output entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction row as decoded by the ingestion layer, not yet validated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Transaction ID
    pub transaction_id: String,

    /// Sending account
    pub sender_id: String,

    /// Receiving account
    pub receiver_id: String,

    /// Amount, as text
    pub amount: String,

    /// Timestamp, as text
    pub timestamp: String,
}

impl TransactionRow {
    /// Create a row from its five fields
    pub fn new(
        transaction_id: impl Into<String>,
        sender_id: impl Into<String>,
        receiver_id: impl Into<String>,
        amount: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            sender_id: sender_id.into(),
            receiver_id: receiver_id.into(),
            amount: amount.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// Validated transaction admitted into the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction ID
    pub id: String,

    /// Sending account
    pub sender: AccountId,

    /// Receiving account
    pub receiver: AccountId,

    /// Amount (strictly positive)
    pub amount: Decimal,

    /// Transfer instant
    pub timestamp: DateTime<Utc>,
}

/// Structural laundering pattern
///
/// Variants are declared in severity order, so the derived `Ord` is the
/// fixed ranking `cycle > layering > fan_in > fan_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    /// Funds returning to their origin
    Cycle,
    /// Pass-through chain
    Layering,
    /// Many senders converging on one account
    FanIn,
    /// One account splitting to many receivers
    FanOut,
}

impl PatternType {
    /// All pattern types, most severe first
    pub const ALL: [PatternType; 4] = [
        PatternType::Cycle,
        PatternType::Layering,
        PatternType::FanIn,
        PatternType::FanOut,
    ];

    /// Severity rank (0 = most severe)
    pub fn rank(&self) -> u8 {
        match self {
            PatternType::Cycle => 0,
            PatternType::Layering => 1,
            PatternType::FanIn => 2,
            PatternType::FanOut => 3,
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Cycle => "cycle",
            PatternType::Layering => "layering",
            PatternType::FanIn => "fan_in",
            PatternType::FanOut => "fan_out",
        }
    }
}

impl fmt::Display for PatternType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One detected occurrence of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    /// Pattern type
    pub pattern_type: PatternType,

    /// Participating accounts, in pattern order
    pub accounts: Vec<AccountId>,

    /// Structural severity in [0, 1]
    pub severity: f64,

    /// Supporting edges
    pub edges: Vec<EdgeId>,
}

impl PatternMatch {
    /// Distinct participating accounts
    pub fn distinct_accounts(&self) -> BTreeSet<&AccountId> {
        self.accounts.iter().collect()
    }
}

/// Per-account aggregate score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspicionScore {
    /// Account
    pub account_id: AccountId,

    /// Score in [0, 100]
    pub score: f64,

    /// Pattern types that contributed
    pub patterns: BTreeSet<PatternType>,
}

/// Cluster of accounts jointly implicated by overlapping matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FraudRing {
    /// Ring ID
    pub ring_id: String,

    /// Dominant pattern type
    pub pattern_type: PatternType,

    /// Highest member score
    pub risk_score: f64,

    /// Members, sorted
    pub member_accounts: Vec<AccountId>,
}

/// Flagged account entry in the result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousAccount {
    /// Account
    pub account_id: AccountId,

    /// Score in [0, 100]
    pub suspicion_score: f64,

    /// Contributing pattern types, most severe first
    pub detected_patterns: Vec<PatternType>,

    /// Ring the account belongs to
    pub ring_id: String,
}

/// Summary counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Distinct accounts in accepted records
    pub total_accounts_analyzed: usize,

    /// Accounts at or above the flag threshold
    pub suspicious_accounts_flagged: usize,

    /// Number of rings
    pub fraud_rings_detected: usize,

    /// Wall-clock seconds for detection, scoring and clustering
    pub processing_time_seconds: f64,
}

/// Why a row was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Blank transaction, sender or receiver id
    MissingField,
    /// Amount is not a decimal number
    InvalidAmount,
    /// Amount is zero or negative
    NonPositiveAmount,
    /// Timestamp could not be parsed
    InvalidTimestamp,
    /// Transaction id already admitted
    DuplicateTransaction,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SkipReason::MissingField => "missing id field",
            SkipReason::InvalidAmount => "amount is not a number",
            SkipReason::NonPositiveAmount => "amount is not positive",
            SkipReason::InvalidTimestamp => "unparseable timestamp",
            SkipReason::DuplicateTransaction => "duplicate transaction id",
        };
        f.write_str(s)
    }
}

/// Skipped row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Zero-based row index in the input
    pub index: usize,

    /// Transaction id, if present
    pub transaction_id: Option<String>,

    /// Reason
    pub reason: SkipReason,
}

/// Run metadata: input accounting, truncation and non-fatal issues
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    /// Run identifier for log correlation
    pub analysis_id: Uuid,

    /// Rows handed to the engine
    pub records_received: usize,

    /// Rows admitted into the graph
    pub records_accepted: usize,

    /// Rows skipped
    pub records_skipped: usize,

    /// First skipped rows (capped by configuration)
    pub skipped_records: Vec<SkippedRecord>,

    /// Whether any detector stopped early
    pub truncated: bool,

    /// Detectors that stopped early
    pub truncated_detectors: Vec<String>,

    /// Non-fatal issues
    pub issues: Vec<Issue>,
}

/// Final analysis payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Summary counters
    pub summary: Summary,

    /// Rings, ordered by ring id
    pub fraud_rings: Vec<FraudRing>,

    /// Flagged accounts, highest score first
    pub suspicious_accounts: Vec<SuspiciousAccount>,

    /// Run metadata
    pub metadata: AnalysisMetadata,
}

impl AnalysisResult {
    /// Serialize to compact JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Serialize to indented JSON
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

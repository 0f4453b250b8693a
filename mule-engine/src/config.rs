//! Configuration for the detection engine
//!
//! All thresholds and window sizes live here and are handed to the
//! [`Analyzer`](crate::Analyzer) at construction, so analyses with different
//! policies can run side by side.

use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cycle detector
    pub cycle: CycleConfig,

    /// Fan-out / fan-in detector
    pub fan: FanConfig,

    /// Layering detector
    pub layering: LayeringConfig,

    /// Suspicion scoring
    pub scoring: ScoringConfig,

    /// Worker pool and budgets
    pub engine: EngineConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cycle: CycleConfig::default(),
            fan: FanConfig::default(),
            layering: LayeringConfig::default(),
            scoring: ScoringConfig::default(),
            engine: EngineConfig::default(),
        }
    }
}

/// Cycle detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Maximum hops per cycle (L_max)
    pub max_hops: usize,

    /// Minimum hops per cycle
    pub min_hops: usize,

    /// First-to-last edge window (W)
    pub window_hours: i64,

    /// Iteration cap
    pub max_iterations: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            max_hops: 6,
            min_hops: 3,
            window_hours: 72,
            max_iterations: 5_000_000,
        }
    }
}

/// Fan detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    /// Distinct receivers needed for fan-out (k_out)
    pub fan_out_threshold: usize,

    /// Distinct senders needed for fan-in (k_in)
    pub fan_in_threshold: usize,

    /// Sliding window (W_fan)
    pub window_hours: i64,

    /// Iteration cap
    pub max_iterations: u64,
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            fan_out_threshold: 8,
            fan_in_threshold: 8,
            window_hours: 24,
            max_iterations: 2_000_000,
        }
    }
}

/// Layering detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayeringConfig {
    /// Relative amount tolerance per hop (ε_amount)
    pub amount_tolerance: f64,

    /// Maximum delay between receiving and forwarding (Δ_t)
    pub max_delay_hours: i64,

    /// Pass-through hops needed for a match
    pub min_passthrough_hops: usize,

    /// Iteration cap
    pub max_iterations: u64,
}

impl Default for LayeringConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: 0.05,
            max_delay_hours: 48,
            min_passthrough_hops: 2,
            max_iterations: 2_000_000,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Score at or above which an account is flagged
    pub flag_threshold: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            flag_threshold: 50.0,
        }
    }
}

/// Worker pool and deadline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Detector worker threads
    pub workers: usize,

    /// Deadline for the whole detection phase (milliseconds)
    pub deadline_ms: u64,

    /// Share of the deadline given to the cycle detector
    pub cycle_share: f64,

    /// Share of the deadline given to the fan detector
    pub fan_share: f64,

    /// Share of the deadline given to the layering detector
    pub layering_share: f64,

    /// Skipped rows listed individually in the metadata
    pub max_skipped_reported: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            deadline_ms: 30_000,
            cycle_share: 0.5,
            fan_share: 0.2,
            layering_share: 0.3,
            max_skipped_reported: 100,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(v) = env_parse("MULE_CYCLE_MAX_HOPS")? {
            config.cycle.max_hops = v;
        }
        if let Some(v) = env_parse("MULE_CYCLE_WINDOW_HOURS")? {
            config.cycle.window_hours = v;
        }
        if let Some(v) = env_parse("MULE_FAN_OUT_THRESHOLD")? {
            config.fan.fan_out_threshold = v;
        }
        if let Some(v) = env_parse("MULE_FAN_IN_THRESHOLD")? {
            config.fan.fan_in_threshold = v;
        }
        if let Some(v) = env_parse("MULE_FAN_WINDOW_HOURS")? {
            config.fan.window_hours = v;
        }
        if let Some(v) = env_parse("MULE_LAYERING_TOLERANCE")? {
            config.layering.amount_tolerance = v;
        }
        if let Some(v) = env_parse("MULE_LAYERING_DELAY_HOURS")? {
            config.layering.max_delay_hours = v;
        }
        if let Some(v) = env_parse("MULE_FLAG_THRESHOLD")? {
            config.scoring.flag_threshold = v;
        }
        if let Some(v) = env_parse("MULE_WORKERS")? {
            config.engine.workers = v;
        }
        if let Some(v) = env_parse("MULE_DEADLINE_MS")? {
            config.engine.deadline_ms = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.cycle.min_hops < 2 {
            return Err(Error::InvalidConfig("cycle.min_hops must be at least 2".to_string()));
        }
        if self.cycle.max_hops < self.cycle.min_hops {
            return Err(Error::InvalidConfig(format!(
                "cycle.max_hops {} is below cycle.min_hops {}",
                self.cycle.max_hops, self.cycle.min_hops
            )));
        }
        let windows = [
            ("cycle.window_hours", self.cycle.window_hours),
            ("fan.window_hours", self.fan.window_hours),
            ("layering.max_delay_hours", self.layering.max_delay_hours),
        ];
        for (name, hours) in windows {
            if hours <= 0 {
                return Err(Error::InvalidConfig(format!("{} must be positive", name)));
            }
            if hours_window(hours).is_none() {
                return Err(Error::InvalidConfig(format!("{} {} is out of range", name, hours)));
            }
        }
        if self.fan.fan_out_threshold < 2 || self.fan.fan_in_threshold < 2 {
            return Err(Error::InvalidConfig("fan thresholds must be at least 2".to_string()));
        }
        if !(0.0..1.0).contains(&self.layering.amount_tolerance) {
            return Err(Error::InvalidConfig(format!(
                "layering.amount_tolerance {} outside [0, 1)",
                self.layering.amount_tolerance
            )));
        }
        if self.layering.min_passthrough_hops == 0 {
            return Err(Error::InvalidConfig("layering.min_passthrough_hops must be positive".to_string()));
        }
        if !(0.0..=100.0).contains(&self.scoring.flag_threshold) {
            return Err(Error::InvalidConfig(format!(
                "scoring.flag_threshold {} outside [0, 100]",
                self.scoring.flag_threshold
            )));
        }
        if self.engine.workers == 0 {
            return Err(Error::InvalidConfig("engine.workers must be positive".to_string()));
        }
        let shares = [self.engine.cycle_share, self.engine.fan_share, self.engine.layering_share];
        if shares.iter().any(|s| !(*s > 0.0 && *s <= 1.0)) {
            return Err(Error::InvalidConfig("detector shares must be in (0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Window length for a configured hour count, `None` when unrepresentable
pub(crate) fn hours_window(hours: i64) -> Option<Duration> {
    Duration::try_hours(hours)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has invalid value {:?}", key, raw))),
        Err(_) => Ok(None),
    }
}

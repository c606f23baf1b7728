//! Adaptive node scoring
//!
//! Judges turn a node's live metrics into votes ([`JudgeRank`]). Arbiters fold
//! the votes into one [`Rank`] and adjust the node's weight and probation
//! state. The [`AdaptiveScorer`] runs judges and arbiters over a candidate on
//! an external cadence and publishes the verdicts read by
//! [`crate::loadbalance::AdaptiveLoadBalance`].
//!
//! # Rank scale
//!
//! | Rank       | Value |
//! |------------|-------|
//! | `Good`     | 3     |
//! | `Fair`     | 2     |
//! | `Poor`     | 1     |
//! | `Disabled` | 0     |

mod arbiter;
mod judge;
mod recorder;
mod scorer;

pub use arbiter::{Arbiter, OverallArbiter, WeightArbiter, aggregate, apply_rank};
pub use judge::{AvailabilityJudge, ConcurrencyJudge, Judge, ResponseTimeJudge};
pub use recorder::{MetricRecorder, RecordingInvoker, WINDOW};
pub use scorer::{AdaptiveScorer, NodeScore, ScoreReport};

use std::fmt;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::humantime_serde;

/// Default probation length for poor or disabled nodes
pub const DEFAULT_DECUBATION: Duration = Duration::from_secs(10);

/// Health verdict, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    /// Healthy
    Good,
    /// Degraded, weight decays
    Fair,
    /// Bad, weight floored and node put on probation
    Poor,
    /// Unusable, weight zero
    Disabled,
}

impl Rank {
    /// Lowest numeric score mapping to this rank
    #[must_use]
    pub const fn min_value(self) -> u64 {
        match self {
            Self::Good => 3,
            Self::Fair => 2,
            Self::Poor => 1,
            Self::Disabled => 0,
        }
    }

    /// Rank for an aggregated numeric score
    #[must_use]
    pub const fn from_score(score: u64) -> Self {
        match score {
            0 => Self::Disabled,
            1 => Self::Poor,
            2 => Self::Fair,
            _ => Self::Good,
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One judge's vote on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JudgeRank {
    /// Verdict
    pub rank: Rank,
    /// Voting weight, 0 abstains
    pub ratio: u32,
}

impl JudgeRank {
    /// Create a vote
    #[must_use]
    pub const fn new(rank: Rank, ratio: u32) -> Self {
        Self { rank, ratio }
    }

    /// A vote without voting power
    #[must_use]
    pub const fn abstain() -> Self {
        Self {
            rank: Rank::Good,
            ratio: 0,
        }
    }

    /// Whether the vote counts
    #[must_use]
    pub const fn votes(&self) -> bool {
        self.ratio > 0
    }
}

/// Metrics snapshot for one node, supplied by the metrics source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMetric {
    /// Requests in the sampling window
    pub requests: u64,
    /// Failed requests in the sampling window
    pub failures: u64,
    /// 90th percentile latency in milliseconds
    pub tp90_ms: u64,
    /// Requests in flight
    pub concurrency: u64,
}

impl NodeMetric {
    /// Fraction of successful requests, `None` without traffic
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn availability(&self) -> Option<f64> {
        if self.requests == 0 {
            return None;
        }
        let ok = self.requests.saturating_sub(self.failures);
        Some(ok as f64 / self.requests as f64)
    }
}

/// Availability thresholds (success ratio, inclusive lower bounds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilityThresholds {
    /// Good at or above
    pub good: f64,
    /// Fair at or above
    pub fair: f64,
    /// Poor at or above, disabled below
    pub poor: f64,
}

impl Default for AvailabilityThresholds {
    fn default() -> Self {
        Self {
            good: 0.99,
            fair: 0.95,
            poor: 0.80,
        }
    }
}

/// Latency thresholds on tp90 (inclusive upper bounds, milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseTimeThresholds {
    /// Good at or below
    pub good_ms: u64,
    /// Fair at or below
    pub fair_ms: u64,
    /// Poor at or below, disabled above
    pub poor_ms: u64,
}

impl Default for ResponseTimeThresholds {
    fn default() -> Self {
        Self {
            good_ms: 100,
            fair_ms: 300,
            poor_ms: 2_000,
        }
    }
}

/// In-flight request thresholds (inclusive upper bounds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyThresholds {
    /// Good at or below
    pub good: u64,
    /// Fair at or below
    pub fair: u64,
    /// Poor at or below, disabled above
    pub poor: u64,
}

impl Default for ConcurrencyThresholds {
    fn default() -> Self {
        Self {
            good: 50,
            fair: 200,
            poor: 1_000,
        }
    }
}

/// Voting weight of each built-in judge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeRatios {
    /// Availability judge
    pub availability: u32,
    /// Response-time judge
    pub response_time: u32,
    /// Concurrency judge
    pub concurrency: u32,
}

impl Default for JudgeRatios {
    fn default() -> Self {
        Self {
            availability: 3,
            response_time: 2,
            concurrency: 1,
        }
    }
}

/// Tunables for the adaptive pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptivePolicy {
    /// Probation length after a poor or disabled verdict
    #[serde(with = "humantime_serde")]
    pub decubation: Duration,
    /// Nodes scored per cycle by sampling arbiters, 0 scores all
    pub sample_size: usize,
    /// Requests needed before a judge votes
    pub min_samples: u64,
    /// Availability judge thresholds
    pub availability: AvailabilityThresholds,
    /// Response-time judge thresholds
    pub response_time: ResponseTimeThresholds,
    /// Concurrency judge thresholds
    pub concurrency: ConcurrencyThresholds,
    /// Judge voting weights
    pub ratios: JudgeRatios,
}

impl Default for AdaptivePolicy {
    fn default() -> Self {
        Self {
            decubation: DEFAULT_DECUBATION,
            sample_size: 16,
            min_samples: 10,
            availability: AvailabilityThresholds::default(),
            response_time: ResponseTimeThresholds::default(),
            concurrency: ConcurrencyThresholds::default(),
            ratios: JudgeRatios::default(),
        }
    }
}

/// Latest metrics per node address
#[derive(Debug, Default)]
pub struct MetricStore {
    metrics: DashMap<String, NodeMetric>,
}

impl MetricStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot for `address`
    pub fn update(&self, address: &str, metric: NodeMetric) {
        self.metrics.insert(address.to_string(), metric);
    }

    /// Snapshot for `address`
    #[must_use]
    pub fn get(&self, address: &str) -> Option<NodeMetric> {
        self.metrics.get(address).map(|m| *m)
    }

    /// Forget `address`
    pub fn remove(&self, address: &str) {
        self.metrics.remove(address);
    }

    /// Keep only the snapshots whose address passes `keep`
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.metrics.retain(|address, _| keep(address));
    }
}

/// Latest arbitration verdict per node address
#[derive(Debug, Default)]
pub struct Verdicts {
    ranks: DashMap<String, Rank>,
}

impl Verdicts {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the verdict for `address`
    pub fn set(&self, address: &str, rank: Rank) {
        self.ranks.insert(address.to_string(), rank);
    }

    /// Verdict for `address`, if scored
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Rank> {
        self.ranks.get(address).map(|r| *r)
    }

    /// Whether `address` was last judged disabled
    #[must_use]
    pub fn is_disabled(&self, address: &str) -> bool {
        self.get(address) == Some(Rank::Disabled)
    }

    /// Forget `address`
    pub fn remove(&self, address: &str) {
        self.ranks.remove(address);
    }

    /// Keep only the verdicts whose address passes `keep`
    pub fn retain(&self, mut keep: impl FnMut(&str) -> bool) {
        self.ranks.retain(|address, _| keep(address));
    }
}

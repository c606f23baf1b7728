//! Arbiters: fold judge votes into a rank and adjust node weight

use telemetry_metrics::counter;
use tracing::{debug, info};

use super::{AdaptivePolicy, JudgeRank, Rank};
use crate::node::{Node, now_millis};

/// Aggregates a node's votes into one rank, with weight side effects
pub trait Arbiter: Send + Sync {
    /// Arbiter name as used in configuration
    fn name(&self) -> &'static str;

    /// Position in the pipeline, lower runs first
    fn order(&self) -> i32;

    /// Whether every node is scored each cycle rather than a sample
    fn evaluates_all(&self) -> bool;

    /// Score `node` at `now_ms` and apply the weight side effect
    fn score_at(&self, node: &Node, ranks: &[JudgeRank], policy: &AdaptivePolicy, now_ms: u64)
    -> Rank;

    /// Score `node` now
    fn score(&self, node: &Node, ranks: &[JudgeRank], policy: &AdaptivePolicy) -> Rank {
        self.score_at(node, ranks, policy, now_millis())
    }
}

/// Combine votes into a rank
///
/// A `Disabled` vote with voting power vetoes everything else. Otherwise the
/// ratio-weighted mean of the rank values decides; with no voting power the
/// node is `Good`.
#[must_use]
pub fn aggregate(ranks: &[JudgeRank]) -> Rank {
    if ranks
        .iter()
        .any(|r| r.votes() && r.rank == Rank::Disabled)
    {
        return Rank::Disabled;
    }
    let (sum, ratios) = ranks
        .iter()
        .filter(|r| r.votes())
        .fold((0u64, 0u64), |(sum, ratios), r| {
            let ratio = u64::from(r.ratio);
            (sum + r.rank.min_value() * ratio, ratios + ratio)
        });
    if ratios == 0 {
        return Rank::Good;
    }
    score_to_rank(sum, ratios)
}

/// Integer mean of the voting ranks
///
/// Values run Good 3, Fair 2, Poor 1, Disabled 0. Disabled votes have already
/// vetoed, so every remaining vote is worth at least 1 and the mean never
/// lands on Disabled.
fn score_to_rank(sum: u64, ratios: u64) -> Rank {
    let score = sum / ratios;
    debug_assert!(score >= Rank::Poor.min_value(), "mean below the lowest vote");
    Rank::from_score(score)
}

/// Apply the weight and probation consequences of `rank` to `node`
pub fn apply_rank(node: &Node, rank: Rank, policy: &AdaptivePolicy, now_ms: u64) {
    match rank {
        Rank::Good => {}
        Rank::Fair => {
            let weight = node.update_weight(|w| (u64::from(w) * 2 / 3).max(1) as u32);
            debug!(node = %node.address(), weight, "Fair verdict, weight decayed");
        }
        Rank::Poor => {
            node.set_weight(1);
            node.start_probation(now_ms, policy.decubation);
            info!(node = %node.address(), "Poor verdict, node on probation");
        }
        Rank::Disabled => {
            node.set_weight(0);
            if !node.is_broken() {
                node.start_probation(now_ms, policy.decubation);
            }
            info!(node = %node.address(), broken = node.is_broken(), "Node disabled");
        }
    }
    counter!("rpc_cluster_rank_total", "rank" => rank.as_str()).increment(1);
}

/// Full rank aggregation on a rotating sample of nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct OverallArbiter;

impl Arbiter for OverallArbiter {
    fn name(&self) -> &'static str {
        "overall"
    }

    fn order(&self) -> i32 {
        100
    }

    fn evaluates_all(&self) -> bool {
        false
    }

    fn score_at(&self, node: &Node, ranks: &[JudgeRank], policy: &AdaptivePolicy, now_ms: u64) -> Rank {
        let rank = aggregate(ranks);
        apply_rank(node, rank, policy, now_ms);
        rank
    }
}

/// Binary usable/disabled verdict on every node each cycle
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightArbiter;

impl Arbiter for WeightArbiter {
    fn name(&self) -> &'static str {
        "weight"
    }

    fn order(&self) -> i32 {
        0
    }

    fn evaluates_all(&self) -> bool {
        true
    }

    fn score_at(&self, node: &Node, ranks: &[JudgeRank], policy: &AdaptivePolicy, now_ms: u64) -> Rank {
        let rank = match aggregate(ranks) {
            Rank::Disabled => Rank::Disabled,
            _ => Rank::Good,
        };
        apply_rank(node, rank, policy, now_ms);
        rank
    }
}

//! Weighted-random selection

use std::sync::Arc;

use super::LoadBalance;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};
use crate::{Error, Result};

/// Picks a node with probability `weight / total_weight`
///
/// Zero-weight nodes are never chosen while any node has positive weight. When
/// every weight is zero the pick degrades to uniform random.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl WeightedRandom {
    /// Create the balancer
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalance for WeightedRandom {
    fn select(&self, candidate: &Candidate, _request: &dyn Invocation) -> Result<Arc<Node>> {
        weighted_pick(candidate)
            .cloned()
            .ok_or_else(|| Error::NoNodeAvailable("random: empty candidate".into()))
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Draw one node from `nodes` proportionally to weight
///
/// Returns `None` for an empty slice.
#[must_use]
pub fn weighted_pick(nodes: &[Arc<Node>]) -> Option<&Arc<Node>> {
    if nodes.is_empty() {
        return None;
    }
    let weights: Vec<u64> = nodes.iter().map(|n| u64::from(n.weight())).collect();
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return nodes.get(rand::random_range(0..nodes.len()));
    }
    pick_at(nodes, &weights, rand::random_range(0..total))
}

/// Node whose cumulative weight range contains `point`
///
/// `weights` are parallel to `nodes`; `point` must lie in `[0, sum(weights))`.
#[must_use]
pub fn pick_at<'a>(nodes: &'a [Arc<Node>], weights: &[u64], point: u64) -> Option<&'a Arc<Node>> {
    let mut upper = 0u64;
    for (node, weight) in nodes.iter().zip(weights) {
        upper = upper.saturating_add(*weight);
        if point < upper {
            return Some(node);
        }
    }
    None
}

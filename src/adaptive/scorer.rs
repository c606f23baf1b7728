//! Scoring pipeline: judges, then arbiters in order, per node

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use super::{AdaptivePolicy, Arbiter, Judge, JudgeRank, MetricStore, Rank, Verdicts};
use crate::node::{Candidate, Node, now_millis};

/// Outcome of one scoring cycle for one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeScore {
    /// Node address
    pub address: String,
    /// Final verdict
    pub rank: Rank,
    /// Weight after the cycle
    pub weight: u32,
}

/// Outcome of one scoring cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScoreReport {
    /// Per-node results in candidate order
    pub scores: Vec<NodeScore>,
}

impl ScoreReport {
    /// Verdict for `address`
    #[must_use]
    pub fn rank_of(&self, address: &str) -> Option<Rank> {
        self.scores
            .iter()
            .find(|s| s.address == address)
            .map(|s| s.rank)
    }

    /// Nodes not disabled this cycle
    #[must_use]
    pub fn survivors(&self) -> usize {
        self.scores
            .iter()
            .filter(|s| s.rank != Rank::Disabled)
            .count()
    }
}

/// Runs the judge and arbiter pipeline over a candidate
pub struct AdaptiveScorer {
    judges: Vec<Arc<dyn Judge>>,
    arbiters: Vec<Arc<dyn Arbiter>>,
    policy: AdaptivePolicy,
    verdicts: Arc<Verdicts>,
    /// Start of the next sampling window
    cursor: AtomicUsize,
}

impl AdaptiveScorer {
    /// Create a scorer; arbiters are sorted by their pipeline position
    #[must_use]
    pub fn new(
        judges: Vec<Arc<dyn Judge>>,
        mut arbiters: Vec<Arc<dyn Arbiter>>,
        policy: AdaptivePolicy,
    ) -> Self {
        arbiters.sort_by_key(|a| a.order());
        Self {
            judges,
            arbiters,
            policy,
            verdicts: Arc::new(Verdicts::new()),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Publish verdicts into an existing table
    #[must_use]
    pub fn with_verdicts(mut self, verdicts: Arc<Verdicts>) -> Self {
        self.verdicts = verdicts;
        self
    }

    /// Verdict table shared with the adaptive load balance
    #[must_use]
    pub fn verdicts(&self) -> Arc<Verdicts> {
        Arc::clone(&self.verdicts)
    }

    /// Active policy
    #[must_use]
    pub fn policy(&self) -> &AdaptivePolicy {
        &self.policy
    }

    /// Arbiter names in pipeline order
    #[must_use]
    pub fn arbiter_names(&self) -> Vec<&'static str> {
        self.arbiters.iter().map(|a| a.name()).collect()
    }

    /// Score every node in `candidate` now
    pub fn run(&self, candidate: &Candidate, metrics: &MetricStore) -> ScoreReport {
        self.run_cycle(candidate, metrics, now_millis())
    }

    /// Score every node in `candidate` at `now_ms`
    pub fn run_cycle(&self, candidate: &Candidate, metrics: &MetricStore, now_ms: u64) -> ScoreReport {
        let len = candidate.len();
        let sample = match self.policy.sample_size {
            0 => len,
            n => n.min(len),
        };
        let start = if len == 0 {
            0
        } else {
            self.cursor.fetch_add(sample, Ordering::Relaxed) % len
        };
        let in_sample = |index: usize| (index + len - start) % len < sample;

        let mut report = ScoreReport::default();
        for (index, node) in candidate.iter().enumerate() {
            recover_if_expired(node, now_ms);

            let ranks: Vec<JudgeRank> = metrics
                .get(node.address())
                .map(|m| self.judges.iter().map(|j| j.judge(&m, &self.policy)).collect())
                .unwrap_or_default();

            let mut verdict = Rank::Good;
            let mut skipped = false;
            for arbiter in &self.arbiters {
                if !arbiter.evaluates_all() && !in_sample(index) {
                    skipped = true;
                    continue;
                }
                verdict = verdict.max(arbiter.score_at(node, &ranks, &self.policy, now_ms));
                if verdict == Rank::Disabled {
                    break;
                }
            }

            // Unsampled nodes keep their last degraded verdict
            if skipped && verdict != Rank::Disabled {
                if let Some(previous) = self
                    .verdicts
                    .get(node.address())
                    .filter(|r| *r != Rank::Disabled)
                {
                    verdict = verdict.max(previous);
                }
            }

            self.verdicts.set(node.address(), verdict);
            report.scores.push(NodeScore {
                address: node.address().to_string(),
                rank: verdict,
                weight: node.weight(),
            });
        }

        debug!(
            nodes = len,
            sampled = sample,
            survivors = report.survivors(),
            "Adaptive scoring cycle complete"
        );
        report
    }
}

/// End an elapsed probation and give the node its discovery weight back
fn recover_if_expired(node: &Node, now_ms: u64) {
    let Some(until) = node.weak_until() else {
        return;
    };
    if now_ms >= until && !node.is_broken() {
        node.clear_probation();
        node.restore_weight();
        info!(node = %node.address(), weight = node.weight(), "Probation over, weight restored");
    }
}

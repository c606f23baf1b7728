//! Election among nodes surviving adaptive arbitration

use std::sync::Arc;

use tracing::warn;

use super::{LoadBalance, weighted_pick};
use crate::adaptive::Verdicts;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};
use crate::{Error, Result};

/// Weighted-random pick over nodes that are neither disabled nor broken
///
/// When arbitration leaves no survivor the election falls back to the full
/// candidate rather than failing the request.
#[derive(Debug, Clone)]
pub struct AdaptiveLoadBalance {
    verdicts: Arc<Verdicts>,
}

impl AdaptiveLoadBalance {
    /// Create an election reading `verdicts`
    #[must_use]
    pub fn new(verdicts: Arc<Verdicts>) -> Self {
        Self { verdicts }
    }
}

impl LoadBalance for AdaptiveLoadBalance {
    fn select(&self, candidate: &Candidate, _request: &dyn Invocation) -> Result<Arc<Node>> {
        if candidate.is_empty() {
            return Err(Error::NoNodeAvailable("adaptive: empty candidate".into()));
        }
        let survivors = candidate.retain(|n| !n.is_broken() && !self.verdicts.is_disabled(n.address()));
        let pool = if survivors.is_empty() {
            warn!(nodes = candidate.len(), "No node survived arbitration, electing from full candidate");
            candidate
        } else {
            &survivors
        };
        weighted_pick(pool)
            .cloned()
            .ok_or_else(|| Error::NoNodeAvailable("adaptive: no electable node".into()))
    }

    fn name(&self) -> &'static str {
        "adaptive"
    }
}

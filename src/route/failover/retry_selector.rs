//! Candidate choice for the next failover attempt

use std::sync::Arc;

use crate::node::{Candidate, Node};

/// Progress of one failover chain
#[derive(Debug, Clone)]
pub struct RetryState {
    attempt: u32,
    origin: Candidate,
}

impl RetryState {
    /// Fresh chain over `origin`
    #[must_use]
    pub fn new(origin: Candidate) -> Self {
        Self { attempt: 0, origin }
    }

    /// Index of the attempt that just failed, starting at 0
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Candidate the chain started with
    #[must_use]
    pub fn origin(&self) -> &Candidate {
        &self.origin
    }

    /// Move to the next attempt
    pub fn advance(&mut self) {
        self.attempt += 1;
    }
}

/// Picks the candidate for the next attempt after a failure
pub trait RetryNodeSelector: Send + Sync {
    /// Candidate for the next attempt
    ///
    /// `failed` is the node that just failed, `None` when the load balance
    /// could not pick one. Implementations never mutate `current`.
    fn select(&self, state: &RetryState, failed: Option<&Arc<Node>>, current: &Candidate) -> Candidate;

    /// Selector name as used in configuration
    fn name(&self) -> &'static str;
}

/// Eliminates each failed node until one remains, then starts over
///
/// A single-node chain keeps retrying that node. When the candidate is down to
/// one node or nothing could be picked, the full original candidate comes back.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleRetrySelector;

impl RetryNodeSelector for SimpleRetrySelector {
    fn select(&self, state: &RetryState, failed: Option<&Arc<Node>>, current: &Candidate) -> Candidate {
        if state.origin().len() <= 1 {
            return current.clone();
        }
        match failed {
            Some(node) if current.len() > 1 => current.exclude(node.address()),
            _ => state.origin().clone(),
        }
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

/// Retries over the same candidate every time
#[derive(Debug, Default, Clone, Copy)]
pub struct ReuseRetrySelector;

impl RetryNodeSelector for ReuseRetrySelector {
    fn select(&self, _state: &RetryState, _failed: Option<&Arc<Node>>, current: &Candidate) -> Candidate {
        current.clone()
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

//! Round-robin selection

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::LoadBalance;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};
use crate::{Error, Result};

/// Fair rotation over the candidate list
///
/// One counter is shared by every caller of this instance. Each call moves it
/// forward exactly once with a compare-and-swap loop, so two concurrent
/// callers never observe the same counter value.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Create a round-robin balancer starting at index 0
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next index for a list of `len` nodes
    fn next_index(&self, len: usize) -> usize {
        let mut current = self.counter.load(Ordering::Relaxed);
        loop {
            let index = current % len;
            match self.counter.compare_exchange_weak(
                current,
                (index + 1) % len,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return index,
                Err(actual) => current = actual,
            }
        }
    }
}

impl LoadBalance for RoundRobin {
    fn select(&self, candidate: &Candidate, _request: &dyn Invocation) -> Result<Arc<Node>> {
        if candidate.is_empty() {
            return Err(Error::NoNodeAvailable("round-robin: empty candidate".into()));
        }
        let index = self.next_index(candidate.len());
        Ok(Arc::clone(&candidate[index]))
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

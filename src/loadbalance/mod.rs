//! Load-balance primitives: pick one node out of a candidate
//!
//! - [`RoundRobin`]: shared atomic counter, fair rotation
//! - [`WeightedRandom`]: probability proportional to node weight
//! - [`AdaptiveLoadBalance`]: weighted election among nodes the adaptive
//!   pipeline has not disabled

mod adaptive;
mod random;
mod round_robin;

pub use adaptive::AdaptiveLoadBalance;
pub use random::{WeightedRandom, pick_at, weighted_pick};
pub use round_robin::RoundRobin;

use std::sync::Arc;

use crate::Result;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};

/// Strategy selecting a single node for one call
pub trait LoadBalance: Send + Sync {
    /// Select a node from `candidate`
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoNodeAvailable`] when the candidate is empty.
    fn select(&self, candidate: &Candidate, request: &dyn Invocation) -> Result<Arc<Node>>;

    /// Strategy name as used in configuration
    fn name(&self) -> &'static str;
}

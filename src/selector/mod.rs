//! Node selectors: narrow a candidate before load balancing
//!
//! Selectors are pure: they return a new [`Candidate`] and never touch the
//! one they were given.

mod simple;
mod tag;

pub use simple::SimpleSelector;
pub use tag::TagSelector;

use std::sync::Arc;

use crate::invocation::Invocation;
use crate::node::Candidate;

/// Filter applied to a candidate for one request
pub trait NodeSelector: Send + Sync {
    /// Narrow `candidate` for `request`
    fn select(&self, candidate: &Candidate, request: &dyn Invocation) -> Candidate;

    /// Selector name as used in configuration
    fn name(&self) -> &'static str;
}

/// Returns its input unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSelector;

impl NodeSelector for NoopSelector {
    fn select(&self, candidate: &Candidate, _request: &dyn Invocation) -> Candidate {
        candidate.clone()
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

/// Pipes a candidate through an ordered list of selectors
#[derive(Clone, Default)]
pub struct CompositeSelector {
    selectors: Vec<Arc<dyn NodeSelector>>,
}

impl CompositeSelector {
    /// Chain `selectors` in order
    #[must_use]
    pub fn new(selectors: Vec<Arc<dyn NodeSelector>>) -> Self {
        Self { selectors }
    }

    /// Names of the chained selectors
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.selectors.iter().map(|s| s.name()).collect()
    }
}

impl NodeSelector for CompositeSelector {
    fn select(&self, candidate: &Candidate, request: &dyn Invocation) -> Candidate {
        self.selectors
            .iter()
            .fold(candidate.clone(), |current, selector| selector.select(&current, request))
    }

    fn name(&self) -> &'static str {
        "composite"
    }
}

impl std::fmt::Debug for CompositeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeSelector")
            .field("selectors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Request;
    use crate::node::{Node, NodeSpec};

    fn candidate() -> Candidate {
        (0..6)
            .map(|i| {
                let tag = if i % 2 == 0 { "blue" } else { "green" };
                Arc::new(Node::new(NodeSpec::new(format!("n{i}")).with_tag("tag", tag)))
            })
            .collect()
    }

    #[test]
    fn test_noop_returns_same_list() {
        let c = candidate();
        assert!(NoopSelector.select(&c, &Request::new("m")).same_list(&c));
    }

    #[test]
    fn test_composite_pipes_in_order() {
        let composite = CompositeSelector::new(vec![
            Arc::new(TagSelector::new("tag", None)),
            Arc::new(SimpleSelector::new(2)),
        ]);
        let req = Request::new("m").with_attachment("tag", "blue");
        let out = composite.select(&candidate(), &req);
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|n| n.tag("tag") == Some("blue")));
        assert_eq!(composite.names(), vec!["tag", "simple"]);
    }

    #[test]
    fn test_empty_composite_is_noop() {
        let c = candidate();
        let out = CompositeSelector::default().select(&c, &Request::new("m"));
        assert!(out.same_list(&c));
    }
}

//! Fixed-window subset selector

use super::NodeSelector;
use crate::invocation::Invocation;
use crate::node::Candidate;

/// Keeps at most `size` contiguous nodes starting at a random offset
///
/// The window wraps around the end of the list, so every node has the same
/// chance of being included.
#[derive(Debug, Clone, Copy)]
pub struct SimpleSelector {
    size: usize,
}

impl SimpleSelector {
    /// Window of `size` nodes; 0 is treated as 1
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    /// Configured window size
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl NodeSelector for SimpleSelector {
    fn select(&self, candidate: &Candidate, _request: &dyn Invocation) -> Candidate {
        if candidate.len() <= self.size {
            return candidate.clone();
        }
        let start = rand::random_range(0..candidate.len());
        candidate.window(start, self.size)
    }

    fn name(&self) -> &'static str {
        "simple"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;
    use crate::invocation::Request;
    use crate::node::{Node, NodeSpec};

    fn candidate(n: usize) -> Candidate {
        (0..n)
            .map(|i| Arc::new(Node::new(NodeSpec::new(format!("n{i}")))))
            .collect()
    }

    #[test]
    fn test_small_candidate_untouched() {
        let c = candidate(3);
        assert!(SimpleSelector::new(3).select(&c, &Request::new("m")).same_list(&c));
    }

    #[test]
    fn test_window_never_exceeds_size() {
        let c = candidate(10);
        let selector = SimpleSelector::new(4);
        let mut starts = HashSet::new();
        for _ in 0..500 {
            let out = selector.select(&c, &Request::new("m"));
            assert_eq!(out.len(), 4);
            let unique: HashSet<_> = out.addresses().into_iter().collect();
            assert_eq!(unique.len(), 4);
            starts.insert(out[0].address().to_string());
        }
        // Wrap-around windows start anywhere
        assert_eq!(starts.len(), 10);
    }

    #[test]
    fn test_zero_size_clamped() {
        assert_eq!(SimpleSelector::new(0).size(), 1);
    }
}

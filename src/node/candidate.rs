//! Copy-on-write node list handed to one request or retry attempt

use std::ops::Deref;
use std::sync::Arc;

use super::Node;

/// A view over the nodes eligible for one dispatch
///
/// Cloning is cheap: the list is shared. Every operation that changes the
/// membership returns a new `Candidate` and leaves the receiver untouched, so a
/// candidate held by concurrent requests can never be modified under them.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    nodes: Arc<Vec<Arc<Node>>>,
}

impl Candidate {
    /// Build a candidate from a node list
    #[must_use]
    pub fn new(nodes: Vec<Arc<Node>>) -> Self {
        Self {
            nodes: Arc::new(nodes),
        }
    }

    /// Nodes in list order
    #[must_use]
    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    /// Node with the given address
    #[must_use]
    pub fn find(&self, address: &str) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| n.address() == address)
    }

    /// Whether a node with the given address is present
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.find(address).is_some()
    }

    /// New candidate without the node at `address`
    #[must_use]
    pub fn exclude(&self, address: &str) -> Self {
        self.retain(|n| n.address() != address)
    }

    /// New candidate keeping only nodes accepted by `keep`
    #[must_use]
    pub fn retain(&self, mut keep: impl FnMut(&Node) -> bool) -> Self {
        Self::new(self.nodes.iter().filter(|n| keep(n)).cloned().collect())
    }

    /// New candidate with `len` nodes starting at `start`, wrapping around
    ///
    /// Returns a clone of `self` when `len` covers the whole list.
    #[must_use]
    pub fn window(&self, start: usize, len: usize) -> Self {
        let total = self.nodes.len();
        if len >= total || total == 0 {
            return self.clone();
        }
        Self::new(
            (0..len)
                .map(|i| Arc::clone(&self.nodes[(start + i) % total]))
                .collect(),
        )
    }

    /// Whether both candidates share the same underlying list
    #[must_use]
    pub fn same_list(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.nodes, &other.nodes)
    }

    /// Addresses in list order
    #[must_use]
    pub fn addresses(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.address().to_string()).collect()
    }
}

impl Deref for Candidate {
    type Target = [Arc<Node>];

    fn deref(&self) -> &Self::Target {
        &self.nodes
    }
}

impl From<Vec<Arc<Node>>> for Candidate {
    fn from(nodes: Vec<Arc<Node>>) -> Self {
        Self::new(nodes)
    }
}

impl FromIterator<Arc<Node>> for Candidate {
    fn from_iter<I: IntoIterator<Item = Arc<Node>>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeSpec;

    fn candidate(addrs: &[&str]) -> Candidate {
        addrs
            .iter()
            .map(|a| Arc::new(Node::new(NodeSpec::new(*a))))
            .collect()
    }

    #[test]
    fn test_exclude_leaves_original_untouched() {
        let original = candidate(&["a", "b", "c"]);
        let shrunk = original.exclude("b");
        assert_eq!(shrunk.addresses(), vec!["a", "c"]);
        assert_eq!(original.addresses(), vec!["a", "b", "c"]);
        assert!(!shrunk.same_list(&original));
    }

    #[test]
    fn test_clone_shares_list() {
        let original = candidate(&["a", "b"]);
        let copy = original.clone();
        assert!(copy.same_list(&original));
    }

    #[test]
    fn test_window_wraps() {
        let c = candidate(&["a", "b", "c", "d"]);
        assert_eq!(c.window(3, 2).addresses(), vec!["d", "a"]);
        assert_eq!(c.window(1, 3).addresses(), vec!["b", "c", "d"]);
        assert!(c.window(2, 4).same_list(&c));
    }

    #[test]
    fn test_find_and_deref() {
        let c = candidate(&["a", "b"]);
        assert!(c.contains("b"));
        assert!(c.find("z").is_none());
        assert_eq!(c.len(), 2);
        assert!(!c.is_empty());
    }
}

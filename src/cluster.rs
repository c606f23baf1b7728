//! Node registry fed by discovery events
//!
//! The registry owns the node list; requests work on [`Candidate`] snapshots
//! taken from it, so membership changes never disturb a request in flight.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::node::{Candidate, Node, NodeHealth, NodeSpec};

/// Discovery notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClusterEvent {
    /// Node announced, or re-announced with new weight or tags
    Add(NodeSpec),
    /// Node withdrawn
    Remove {
        /// Node address
        address: String,
    },
    /// Registry weight hint
    Weight {
        /// Node address
        address: String,
        /// New origin weight
        weight: u32,
    },
    /// Node stopped answering
    Down {
        /// Node address
        address: String,
    },
    /// Node answering again
    Up {
        /// Node address
        address: String,
    },
    /// Node permanently faulty (or cleared)
    Broken {
        /// Node address
        address: String,
        /// Flag value
        broken: bool,
    },
}

/// Live node list of one service interface
#[derive(Default)]
pub struct Cluster {
    nodes: RwLock<Vec<Arc<Node>>>,
}

impl Cluster {
    /// Create an empty cluster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cluster holding `specs`
    pub fn from_specs(specs: impl IntoIterator<Item = NodeSpec>) -> Self {
        let cluster = Self::new();
        for spec in specs {
            cluster.apply(ClusterEvent::Add(spec));
        }
        cluster
    }

    /// Apply a discovery event
    ///
    /// Returns `false` when the event names an unknown node.
    pub fn apply(&self, event: ClusterEvent) -> bool {
        match event {
            ClusterEvent::Add(spec) => {
                let mut nodes = self.nodes.write();
                if let Some(pos) = nodes.iter().position(|n| n.address() == spec.address) {
                    // Tags are immutable on a node, so a re-announce swaps it
                    let node = Arc::new(Node::new(spec));
                    node.set_alive(nodes[pos].is_alive());
                    node.set_broken(nodes[pos].is_broken());
                    debug!(node = %node.address(), weight = node.weight(), "Node refreshed");
                    nodes[pos] = node;
                } else {
                    info!(node = %spec.address, weight = spec.weight, "Node added");
                    nodes.push(Arc::new(Node::new(spec)));
                }
                true
            }
            ClusterEvent::Remove { address } => {
                let mut nodes = self.nodes.write();
                let before = nodes.len();
                nodes.retain(|n| n.address() != address);
                let removed = nodes.len() != before;
                if removed {
                    info!(node = %address, "Node removed");
                }
                removed
            }
            ClusterEvent::Weight { address, weight } => {
                self.with_node(&address, |node| node.set_origin_weight(weight))
            }
            ClusterEvent::Down { address } => self.with_node(&address, |node| {
                info!(node = %address, "Node down");
                node.set_alive(false);
            }),
            ClusterEvent::Up { address } => self.with_node(&address, |node| {
                info!(node = %address, "Node up");
                node.set_alive(true);
            }),
            ClusterEvent::Broken { address, broken } => {
                self.with_node(&address, |node| node.set_broken(broken))
            }
        }
    }

    fn with_node(&self, address: &str, f: impl FnOnce(&Node)) -> bool {
        match self.get(address) {
            Some(node) => {
                f(&node);
                true
            }
            None => {
                debug!(node = %address, "Event for unknown node ignored");
                false
            }
        }
    }

    /// Node by address
    #[must_use]
    pub fn get(&self, address: &str) -> Option<Arc<Node>> {
        self.nodes
            .read()
            .iter()
            .find(|n| n.address() == address)
            .map(Arc::clone)
    }

    /// Every registered node, alive or not
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Node>> {
        self.nodes.read().clone()
    }

    /// Snapshot of the alive nodes in registration order
    #[must_use]
    pub fn candidate(&self) -> Candidate {
        self.nodes
            .read()
            .iter()
            .filter(|n| n.is_alive())
            .cloned()
            .collect()
    }

    /// Health of every node
    #[must_use]
    pub fn statuses(&self) -> HashMap<String, NodeHealth> {
        self.nodes
            .read()
            .iter()
            .map(|n| (n.address().to_string(), n.health()))
            .collect()
    }

    /// Registered node count
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// No nodes registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("nodes", &self.nodes.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::from_specs(["a", "b", "c"].map(NodeSpec::new))
    }

    #[test]
    fn test_candidate_keeps_registration_order() {
        assert_eq!(cluster().candidate().addresses(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_down_nodes_excluded() {
        let cluster = cluster();
        assert!(cluster.apply(ClusterEvent::Down { address: "b".into() }));
        assert_eq!(cluster.candidate().addresses(), vec!["a", "c"]);
        assert_eq!(cluster.statuses()["b"], NodeHealth::Dead);
        cluster.apply(ClusterEvent::Up { address: "b".into() });
        assert_eq!(cluster.candidate().len(), 3);
    }

    #[test]
    fn test_remove_keeps_snapshot() {
        let cluster = cluster();
        let snapshot = cluster.candidate();
        assert!(cluster.apply(ClusterEvent::Remove { address: "a".into() }));
        assert_eq!(snapshot.len(), 3);
        assert_eq!(cluster.candidate().addresses(), vec!["b", "c"]);
        assert!(!cluster.apply(ClusterEvent::Remove { address: "a".into() }));
    }

    #[test]
    fn test_weight_hint_restores_weight() {
        let cluster = cluster();
        let node = cluster.get("a").unwrap();
        node.set_weight(1);
        cluster.apply(ClusterEvent::Weight {
            address: "a".into(),
            weight: 40,
        });
        assert_eq!(node.origin_weight(), 40);
        assert_eq!(node.weight(), 40);
    }

    #[test]
    fn test_readd_refreshes_tags_and_keeps_position() {
        let cluster = cluster();
        cluster.apply(ClusterEvent::Broken {
            address: "b".into(),
            broken: true,
        });
        cluster.apply(ClusterEvent::Add(NodeSpec::new("b").with_tag("zone", "eu")));
        let b = cluster.get("b").unwrap();
        assert_eq!(b.tag("zone"), Some("eu"));
        assert!(b.is_broken());
        assert_eq!(cluster.candidate().addresses(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_unknown_node_event() {
        assert!(!cluster().apply(ClusterEvent::Up { address: "z".into() }));
    }

    #[test]
    fn test_event_from_json() {
        let event: ClusterEvent =
            serde_json::from_str(r#"{"event":"weight","address":"a","weight":7}"#).unwrap();
        assert_eq!(
            event,
            ClusterEvent::Weight {
                address: "a".into(),
                weight: 7
            }
        );
    }
}

//! Cluster nodes and per-request candidate views
//!
//! A [`Node`] is one remote endpoint. Its identity and tags are fixed at
//! registration; weight and health live in atomics so the adaptive pipeline can
//! update them while load balancers read them concurrently. Readers may see a
//! slightly stale weight, never a torn one.

mod candidate;

pub use candidate::Candidate;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Current wall-clock time in milliseconds since the Unix epoch
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Static description of a node as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Network address (`host:port`), the node identity
    pub address: String,
    /// Optional human-readable alias
    #[serde(default)]
    pub alias: Option<String>,
    /// Registry-assigned weight
    #[serde(default = "default_weight")]
    pub weight: u32,
    /// Free-form tags (region, version, ...)
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

fn default_weight() -> u32 {
    100
}

impl NodeSpec {
    /// Create a spec with the default weight and no tags
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            alias: None,
            weight: default_weight(),
            tags: HashMap::new(),
        }
    }

    /// Set the weight
    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Add a tag
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Observable health state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeHealth {
    /// Serving normally
    Alive,
    /// On probation until the recorded timestamp
    Weak,
    /// Permanently marked as broken
    Broken,
    /// Reported down by discovery
    Dead,
}

/// One remote endpoint with live weight and health state
pub struct Node {
    address: String,
    alias: Option<String>,
    tags: HashMap<String, String>,
    origin_weight: AtomicU32,
    weight: AtomicU32,
    alive: AtomicBool,
    broken: AtomicBool,
    /// Probation end (millis since epoch), 0 when not on probation
    weak_until: AtomicU64,
}

impl Node {
    /// Create a node from its discovery spec
    #[must_use]
    pub fn new(spec: NodeSpec) -> Self {
        Self {
            address: spec.address,
            alias: spec.alias,
            tags: spec.tags,
            origin_weight: AtomicU32::new(spec.weight),
            weight: AtomicU32::new(spec.weight),
            alive: AtomicBool::new(true),
            broken: AtomicBool::new(false),
            weak_until: AtomicU64::new(0),
        }
    }

    /// Node address
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Alias, falling back to the address
    #[must_use]
    pub fn name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.address)
    }

    /// Tag value by key
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Current weight
    #[must_use]
    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Acquire)
    }

    /// Replace the current weight
    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight, Ordering::Release);
    }

    /// Atomically rewrite the weight with `f`, returning the new value
    pub fn update_weight(&self, f: impl Fn(u32) -> u32) -> u32 {
        let mut current = self.weight.load(Ordering::Acquire);
        loop {
            let next = f(current);
            match self.weight.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    /// Weight assigned by discovery
    #[must_use]
    pub fn origin_weight(&self) -> u32 {
        self.origin_weight.load(Ordering::Acquire)
    }

    /// Record a new discovery weight and apply it
    pub fn set_origin_weight(&self, weight: u32) {
        self.origin_weight.store(weight, Ordering::Release);
        self.set_weight(weight);
    }

    /// Reset the live weight to the discovery weight
    pub fn restore_weight(&self) {
        self.set_weight(self.origin_weight());
    }

    /// Whether discovery reports the node as up
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Mark the node up or down
    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::Release);
    }

    /// Whether the node is permanently broken
    #[must_use]
    pub fn is_broken(&self) -> bool {
        self.broken.load(Ordering::Acquire)
    }

    /// Set or clear the broken flag
    pub fn set_broken(&self, broken: bool) {
        self.broken.store(broken, Ordering::Release);
    }

    /// Put the node on probation for `duration` starting at `now_ms`
    ///
    /// Restarts any probation already running.
    pub fn start_probation(&self, now_ms: u64, duration: Duration) {
        let until = now_ms.saturating_add(duration.as_millis() as u64);
        self.weak_until.store(until, Ordering::Release);
        debug!(node = %self.address, until_ms = until, "Node placed on probation");
    }

    /// End probation
    pub fn clear_probation(&self) {
        self.weak_until.store(0, Ordering::Release);
    }

    /// Probation end in epoch millis, if any was ever set
    #[must_use]
    pub fn weak_until(&self) -> Option<u64> {
        match self.weak_until.load(Ordering::Acquire) {
            0 => None,
            until => Some(until),
        }
    }

    /// Whether the node is on probation at `now_ms`
    #[must_use]
    pub fn is_weak_at(&self, now_ms: u64) -> bool {
        self.weak_until().is_some_and(|until| now_ms < until)
    }

    /// Health state at `now_ms`
    #[must_use]
    pub fn health_at(&self, now_ms: u64) -> NodeHealth {
        if !self.is_alive() {
            NodeHealth::Dead
        } else if self.is_broken() {
            NodeHealth::Broken
        } else if self.is_weak_at(now_ms) {
            NodeHealth::Weak
        } else {
            NodeHealth::Alive
        }
    }

    /// Health state now
    #[must_use]
    pub fn health(&self) -> NodeHealth {
        self.health_at(now_millis())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("address", &self.address)
            .field("weight", &self.weight())
            .field("alive", &self.is_alive())
            .field("broken", &self.is_broken())
            .field("weak_until", &self.weak_until())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_from_spec() {
        let node = Node::new(
            NodeSpec::new("10.0.0.1:9000")
                .with_weight(40)
                .with_tag("region", "eu"),
        );
        assert_eq!(node.address(), "10.0.0.1:9000");
        assert_eq!(node.weight(), 40);
        assert_eq!(node.origin_weight(), 40);
        assert_eq!(node.tag("region"), Some("eu"));
        assert_eq!(node.tag("zone"), None);
        assert_eq!(node.health(), NodeHealth::Alive);
    }

    #[test]
    fn test_update_weight_applies_function() {
        let node = Node::new(NodeSpec::new("a:1").with_weight(9));
        assert_eq!(node.update_weight(|w| w * 2 / 3), 6);
        assert_eq!(node.weight(), 6);
        node.restore_weight();
        assert_eq!(node.weight(), 9);
    }

    #[test]
    fn test_probation_window() {
        let node = Node::new(NodeSpec::new("a:1"));
        assert!(node.weak_until().is_none());

        node.start_probation(1_000, Duration::from_secs(10));
        assert_eq!(node.weak_until(), Some(11_000));
        assert_eq!(node.health_at(5_000), NodeHealth::Weak);
        assert_eq!(node.health_at(11_000), NodeHealth::Alive);
    }

    #[test]
    fn test_health_precedence() {
        let node = Node::new(NodeSpec::new("a:1"));
        node.start_probation(0, Duration::from_secs(60));
        node.set_broken(true);
        assert_eq!(node.health_at(1), NodeHealth::Broken);
        node.set_alive(false);
        assert_eq!(node.health_at(1), NodeHealth::Dead);
    }

    #[test]
    fn test_spec_deserialize_defaults() {
        let spec: NodeSpec = serde_yaml::from_str("address: \"b:2\"").unwrap();
        assert_eq!(spec.weight, 100);
        assert!(spec.tags.is_empty());
    }
}

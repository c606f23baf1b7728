//! Dispatch topologies
//!
//! A [`Route`] decides the call pattern for one request: one node, every node,
//! a bounded fan-out, a pinned node, or a filtered subset. Every topology is
//! generic over the request and response types and reaches the network through
//! an [`Invoker`] supplied by the transport layer.

mod broadcast;
mod condition;
pub mod failover;
mod forking;
mod pinpoint;
mod single;

pub use broadcast::BroadcastRoute;
pub use condition::{ConditionRoute, MethodRule, MethodRules, NodePredicate};
pub use failover::FailoverRoute;
pub use forking::ForkingRoute;
pub use pinpoint::PinpointRoute;
pub use single::SingleRoute;

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};

/// Requests that can travel through a topology
///
/// Fan-out topologies clone the request per node and move it into spawned
/// tasks.
pub trait RouteRequest: Invocation + Clone + 'static {}

impl<T> RouteRequest for T where T: Invocation + Clone + 'static {}

/// Network call primitive provided by the transport layer
#[async_trait]
pub trait Invoker<Req, Resp>: Send + Sync + 'static {
    /// Send `request` to `node`
    ///
    /// Business exceptions come back as [`crate::Error::Business`], transport
    /// failures as [`crate::Error::Transport`].
    async fn invoke(&self, node: Arc<Node>, request: Req) -> Result<Resp>;
}

/// Call pattern over a candidate
#[async_trait]
pub trait Route<Req, Resp>: Send + Sync {
    /// Dispatch `request` over `candidate`
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp>;

    /// Topology name as used in configuration
    fn name(&self) -> &'static str;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted invoker shared by the topology tests

    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::Invoker;
    use crate::invocation::Request;
    use crate::node::{Candidate, Node, NodeSpec};
    use crate::{Error, Result};

    /// What a scripted node does when called
    #[derive(Debug, Clone)]
    pub enum Script {
        /// Reply with the node address after a delay
        Ok(Duration),
        /// Business error after a delay
        Business(Duration),
        /// Retryable transport error after a delay
        Fail(Duration),
        /// Non-retryable transport error
        Fatal,
    }

    /// Invoker following a per-address script and recording calls
    #[derive(Default)]
    pub struct ScriptedInvoker {
        scripts: HashMap<String, Script>,
        pub calls: Mutex<Vec<String>>,
    }

    impl ScriptedInvoker {
        pub fn new(scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                scripts: scripts
                    .iter()
                    .map(|(a, s)| ((*a).to_string(), s.clone()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl Invoker<Request, String> for ScriptedInvoker {
        async fn invoke(&self, node: Arc<Node>, _request: Request) -> Result<String> {
            let address = node.address().to_string();
            self.calls.lock().push(address.clone());
            match self.scripts.get(&address).cloned().unwrap_or(Script::Ok(Duration::ZERO)) {
                Script::Ok(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(address)
                }
                Script::Business(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(Error::business(format!("E-{address}"), "rejected"))
                }
                Script::Fail(delay) => {
                    tokio::time::sleep(delay).await;
                    Err(Error::transport(address, "connection reset", true))
                }
                Script::Fatal => Err(Error::transport(address, "bad frame", false)),
            }
        }
    }

    pub fn candidate(addrs: &[&str]) -> Candidate {
        addrs
            .iter()
            .map(|a| Arc::new(Node::new(NodeSpec::new(*a))))
            .collect()
    }

    pub fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }
}

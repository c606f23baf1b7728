//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rpc_cluster::invocation::Request;
use rpc_cluster::node::{Candidate, Node, NodeSpec};
use rpc_cluster::route::Invoker;
use rpc_cluster::{Error, Result};

/// Scripted node behavior
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Reply(Duration),
    Retryable(Duration),
    Business(Duration),
}

/// Invoker replying per node address and recording the call order
#[derive(Default)]
pub struct FakeTransport {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<String>>,
}

impl FakeTransport {
    pub fn new(behaviors: &[(&str, Behavior)]) -> Arc<Self> {
        Arc::new(Self {
            behaviors: behaviors
                .iter()
                .map(|(a, b)| ((*a).to_string(), *b))
                .collect(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Invoker<Request, String> for FakeTransport {
    async fn invoke(&self, node: Arc<Node>, _request: Request) -> Result<String> {
        let address = node.address().to_string();
        self.calls.lock().push(address.clone());
        match self
            .behaviors
            .get(&address)
            .copied()
            .unwrap_or(Behavior::Reply(Duration::ZERO))
        {
            Behavior::Reply(delay) => {
                tokio::time::sleep(delay).await;
                Ok(address)
            }
            Behavior::Retryable(delay) => {
                tokio::time::sleep(delay).await;
                Err(Error::transport(address, "connection refused", true))
            }
            Behavior::Business(delay) => {
                tokio::time::sleep(delay).await;
                Err(Error::business("E_REJECTED", format!("{address} rejected")))
            }
        }
    }
}

pub fn candidate(addresses: &[&str]) -> Candidate {
    addresses
        .iter()
        .map(|a| Arc::new(Node::new(NodeSpec::new(*a))))
        .collect()
}

pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

pub fn as_invoker(transport: &Arc<FakeTransport>) -> Arc<dyn Invoker<Request, String>> {
    Arc::clone(transport) as Arc<dyn Invoker<Request, String>>
}

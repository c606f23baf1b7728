//! Simulated transport and load driver
//!
//! Backs the `simulate` command: every node answers after a configured latency
//! and fails with configured probabilities, so routing, failover and adaptive
//! scoring can be observed without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tracing::info;

use crate::adaptive::Rank;
use crate::cluster::Cluster;
use crate::config::{ClusterConfig, SimNodeConfig};
use crate::invocation::Request;
use crate::invoker::ClusterInvoker;
use crate::node::Node;
use crate::route::Invoker;
use crate::strategy::StrategyRegistry;
use crate::{Error, Result};

#[derive(Debug, Clone)]
struct Behavior {
    failure_rate: f64,
    business_error_rate: f64,
    business_code: String,
    latency: Duration,
}

impl From<&SimNodeConfig> for Behavior {
    fn from(config: &SimNodeConfig) -> Self {
        Self {
            failure_rate: config.failure_rate,
            business_error_rate: config.business_error_rate,
            business_code: config.business_code.clone(),
            latency: config.latency,
        }
    }
}

/// In-process transport with per-node failure rates and latency
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    behaviors: HashMap<String, Behavior>,
    calls: DashMap<String, u64>,
}

impl SimulatedTransport {
    /// Transport for the configured simulation nodes
    #[must_use]
    pub fn new(nodes: &[SimNodeConfig]) -> Self {
        Self {
            behaviors: nodes
                .iter()
                .map(|n| (n.node.address.clone(), Behavior::from(n)))
                .collect(),
            calls: DashMap::new(),
        }
    }

    /// Calls received per node address
    #[must_use]
    pub fn calls(&self) -> BTreeMap<String, u64> {
        self.calls
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }
}

#[async_trait]
impl Invoker<Request, Value> for SimulatedTransport {
    async fn invoke(&self, node: Arc<Node>, request: Request) -> Result<Value> {
        *self.calls.entry(node.address().to_string()).or_insert(0) += 1;
        let Some(behavior) = self.behaviors.get(node.address()) else {
            return Err(Error::transport(node.address(), "unknown node", false));
        };
        if !behavior.latency.is_zero() {
            tokio::time::sleep(behavior.latency).await;
        }

        let roll: f64 = rand::random_range(0.0..1.0);
        if roll < behavior.failure_rate {
            return Err(Error::transport(node.address(), "simulated connection reset", true));
        }
        if roll < behavior.failure_rate + behavior.business_error_rate {
            return Err(Error::business(
                behavior.business_code.clone(),
                "simulated business error",
            ));
        }
        Ok(json!({
            "node": node.address(),
            "method": request.method,
            "payload": request.payload,
        }))
    }
}

/// Result of a simulation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationSummary {
    /// Interface name
    pub interface: String,
    /// Topology used
    pub route: String,
    /// Requests sent
    pub requests: usize,
    /// Requests that returned a value
    pub succeeded: usize,
    /// Failed requests by error reason
    pub failures: BTreeMap<String, usize>,
    /// Transport calls per node, retries included
    pub calls: BTreeMap<String, u64>,
    /// Rank of every node after the final scoring cycle
    pub ranks: BTreeMap<String, Rank>,
    /// Weight of every node after the final scoring cycle
    pub weights: BTreeMap<String, u32>,
    /// Wall-clock duration
    pub elapsed_ms: u64,
}

/// Drive the configured simulation to completion
///
/// # Errors
///
/// Returns [`Error::Config`] when the configuration is invalid or declares no
/// nodes.
pub async fn run(config: &ClusterConfig, registry: &StrategyRegistry) -> Result<SimulationSummary> {
    let sim = &config.simulation;
    if sim.nodes.is_empty() {
        return Err(Error::Config("simulation.nodes is empty".into()));
    }

    let cluster = Arc::new(Cluster::from_specs(sim.nodes.iter().map(|n| n.node.clone())));
    let transport = Arc::new(SimulatedTransport::new(&sim.nodes));
    let invoker = Arc::new(ClusterInvoker::from_config(
        config,
        cluster,
        Arc::clone(&transport) as Arc<dyn Invoker<Request, Value>>,
        registry,
    )?);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scoring = invoker.spawn_scoring(config.adaptive.interval, shutdown_rx);

    info!(
        interface = %config.name,
        nodes = sim.nodes.len(),
        requests = sim.requests,
        concurrency = sim.concurrency,
        "Simulation started"
    );
    let started = Instant::now();
    let outcomes: Vec<Result<Value>> = futures::stream::iter(0..sim.requests)
        .map(|i| {
            let invoker = Arc::clone(&invoker);
            let request = Request::new(sim.method.clone()).with_payload(json!({ "seq": i }));
            async move { invoker.invoke(request).await }
        })
        .buffer_unordered(sim.concurrency.max(1))
        .collect()
        .await;
    let elapsed = started.elapsed();

    let _ = shutdown_tx.send(());
    let _ = scoring.await;

    let report = invoker.score();
    let mut summary = SimulationSummary {
        interface: config.name.clone(),
        route: invoker.route_name().to_string(),
        requests: sim.requests,
        calls: transport.calls(),
        elapsed_ms: elapsed.as_millis() as u64,
        ..Default::default()
    };
    for outcome in outcomes {
        match outcome {
            Ok(_) => summary.succeeded += 1,
            Err(e) => *summary.failures.entry(e.reason().to_string()).or_insert(0) += 1,
        }
    }
    for score in report.scores {
        summary.ranks.insert(score.address.clone(), score.rank);
        summary.weights.insert(score.address, score.weight);
    }
    info!(
        succeeded = summary.succeeded,
        failed = summary.requests - summary.succeeded,
        elapsed_ms = summary.elapsed_ms,
        "Simulation finished"
    );
    Ok(summary)
}

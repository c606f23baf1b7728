//! Assembled request path
//!
//! A [`ClusterInvoker`] takes a snapshot of the alive nodes, narrows it with
//! the selector chain and hands it to the configured topology (wrapped in the
//! failover controller for single dispatch). Every transport call passes
//! through a [`RecordingInvoker`] so the adaptive scorer sees live metrics.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use telemetry_metrics::counter;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::adaptive::{
    AdaptiveScorer, MetricRecorder, MetricStore, RecordingInvoker, ScoreReport, Verdicts,
};
use crate::cluster::{Cluster, ClusterEvent};
use crate::config::{ClusterConfig, RouteConfig, RouteKind};
use crate::node::now_millis;
use crate::route::failover::FailoverPolicies;
use crate::route::{
    BroadcastRoute, ConditionRoute, FailoverRoute, ForkingRoute, Invoker, MethodRules,
    NodePredicate, PinpointRoute, Route, RouteRequest, SingleRoute,
};
use crate::selector::{CompositeSelector, NodeSelector};
use crate::strategy::{BuildContext, StrategyRegistry};
use crate::{Error, Result};

/// Shortest scoring period `spawn_scoring` accepts
pub const MIN_SCORING_INTERVAL: Duration = Duration::from_millis(1);

/// Client-side entry point for one clustered interface
pub struct ClusterInvoker<Req, Resp> {
    name: String,
    cluster: Arc<Cluster>,
    selector: CompositeSelector,
    route: Arc<dyn Route<Req, Resp>>,
    scorer: Arc<AdaptiveScorer>,
    recorder: Arc<MetricRecorder>,
    metrics: Arc<MetricStore>,
}

impl<Req, Resp> ClusterInvoker<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    /// Assemble the request path described by `config`
    ///
    /// Strategy names are resolved here, once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid or names an
    /// unknown strategy.
    pub fn from_config(
        config: &ClusterConfig,
        cluster: Arc<Cluster>,
        transport: Arc<dyn Invoker<Req, Resp>>,
        registry: &StrategyRegistry,
    ) -> Result<Self> {
        config.validate_with(registry)?;

        let verdicts = Arc::new(Verdicts::new());
        let ctx = BuildContext {
            config,
            verdicts: &verdicts,
        };

        let selector = CompositeSelector::new(
            config
                .selectors
                .iter()
                .map(|name| registry.selector(name, &ctx))
                .collect::<Result<Vec<_>>>()?,
        );

        let judges = config
            .adaptive
            .judges
            .iter()
            .map(|name| registry.judge(name, &ctx))
            .collect::<Result<Vec<_>>>()?;
        let arbiters = config
            .adaptive
            .arbiters
            .iter()
            .map(|name| registry.arbiter(name, &ctx))
            .collect::<Result<Vec<_>>>()?;
        let scorer = Arc::new(
            AdaptiveScorer::new(judges, arbiters, config.adaptive.policy.clone())
                .with_verdicts(Arc::clone(&verdicts)),
        );

        let recorder = Arc::new(MetricRecorder::new());
        let invoker: Arc<dyn Invoker<Req, Resp>> =
            Arc::new(RecordingInvoker::new(transport, Arc::clone(&recorder)));

        let builder = TopologyBuilder {
            config,
            registry,
            ctx: &ctx,
            invoker,
        };
        let route = builder.build(config.route.kind)?;

        info!(
            interface = %config.name,
            load_balance = %config.load_balance,
            selectors = ?selector.names(),
            route = route.name(),
            "Cluster invoker ready"
        );

        Ok(Self {
            name: config.name.clone(),
            cluster,
            selector,
            route,
            scorer,
            recorder,
            metrics: Arc::new(MetricStore::new()),
        })
    }

    /// Send `request` to the cluster
    ///
    /// # Errors
    ///
    /// Returns the topology's outcome: a transport or business error from a
    /// node, or a cluster error naming why no node could answer.
    #[tracing::instrument(
        skip(self, request),
        fields(interface = %self.name, method = %request.method(), request_id = %uuid::Uuid::new_v4())
    )]
    pub async fn invoke(&self, request: Req) -> Result<Resp> {
        counter!("rpc_cluster_requests_total").increment(1);
        let candidate = self.selector.select(&self.cluster.candidate(), &request);
        debug!(nodes = candidate.len(), "Candidate selected");

        let outcome = self.route.route(&candidate, request).await;
        if let Err(e) = &outcome {
            // Failover already counted its own verdicts
            let counted = matches!(
                e,
                Error::RetriesExhausted { .. }
                    | Error::DeadlineExceeded { .. }
                    | Error::NoAliveAfterRetry(_)
            );
            if !counted {
                counter!("rpc_cluster_failures_total", "reason" => e.reason()).increment(1);
            }
            debug!(error = %e, "Request failed");
        }
        outcome
    }
}

impl<Req, Resp> ClusterInvoker<Req, Resp> {
    /// Interface name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Node registry
    #[must_use]
    pub fn cluster(&self) -> &Arc<Cluster> {
        &self.cluster
    }

    /// Adaptive scorer
    #[must_use]
    pub fn scorer(&self) -> &Arc<AdaptiveScorer> {
        &self.scorer
    }

    /// Metric snapshots used by the last scoring cycle
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricStore> {
        &self.metrics
    }

    /// Topology name
    #[must_use]
    pub fn route_name(&self) -> &'static str {
        self.route.name()
    }

    /// Apply a discovery event to the cluster
    ///
    /// A removed node also loses its recorded metrics and verdict, so a node
    /// re-added under the same address starts clean.
    pub fn apply(&self, event: ClusterEvent) -> bool {
        let removed = match &event {
            ClusterEvent::Remove { address } => Some(address.clone()),
            _ => None,
        };
        let changed = self.cluster.apply(event);
        if let Some(address) = removed.filter(|_| changed) {
            self.forget(&address);
            debug!(interface = %self.name, node = %address, "Node state dropped");
        }
        changed
    }

    fn forget(&self, address: &str) {
        self.recorder.forget(address);
        self.metrics.remove(address);
        self.scorer.verdicts().remove(address);
    }

    /// Publish recorded metrics and run one scoring cycle
    ///
    /// Nodes no longer registered are pruned first. A node whose probation
    /// has run out starts over with an empty window, so samples taken before
    /// it was disabled cannot disable it again.
    pub fn score(&self) -> ScoreReport {
        let registered: HashSet<String> = self
            .cluster
            .all()
            .iter()
            .map(|n| n.address().to_string())
            .collect();
        self.recorder.retain(|a| registered.contains(a));
        self.metrics.retain(|a| registered.contains(a));
        self.scorer.verdicts().retain(|a| registered.contains(a));

        let candidate = self.cluster.candidate();
        let now_ms = now_millis();
        for node in candidate.iter() {
            let expired = node.weak_until().is_some_and(|until| now_ms >= until);
            if expired && !node.is_broken() {
                self.recorder.forget(node.address());
                self.metrics.remove(node.address());
            }
        }

        self.recorder.publish(&self.metrics);
        self.scorer.run_cycle(&candidate, &self.metrics, now_ms)
    }
}

impl<Req, Resp> ClusterInvoker<Req, Resp>
where
    Req: Send + Sync + 'static,
    Resp: Send + 'static,
{
    /// Score the cluster every `interval` until `shutdown` fires
    pub fn spawn_scoring(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let invoker = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(interval.max(MIN_SCORING_INTERVAL));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = invoker.score();
                        let disabled = report.scores.len() - report.survivors();
                        if disabled > 0 {
                            warn!(interface = %invoker.name, disabled, "Nodes disabled by scoring");
                        } else {
                            debug!(interface = %invoker.name, nodes = report.scores.len(), "Scoring cycle");
                        }
                    }
                    _ = shutdown.recv() => {
                        break;
                    }
                }
            }
        })
    }
}

struct TopologyBuilder<'a, Req, Resp> {
    config: &'a ClusterConfig,
    registry: &'a StrategyRegistry,
    ctx: &'a BuildContext<'a>,
    invoker: Arc<dyn Invoker<Req, Resp>>,
}

impl<Req, Resp> TopologyBuilder<'_, Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    fn build(&self, kind: RouteKind) -> Result<Arc<dyn Route<Req, Resp>>> {
        let route = &self.config.route;
        let load_balance = self
            .registry
            .load_balance(&self.config.load_balance, self.ctx)?;
        let invoker = Arc::clone(&self.invoker);

        Ok(match kind {
            RouteKind::Single => {
                let single: Arc<dyn Route<Req, Resp>> =
                    Arc::new(SingleRoute::new(Arc::clone(&load_balance), Arc::clone(&invoker)));
                let failover = &self.config.failover;
                Arc::new(FailoverRoute::new(
                    FailoverPolicies::from_config(failover)?,
                    load_balance,
                    self.registry
                        .retry_selector(&failover.retry_selector, self.ctx)?,
                    invoker,
                    single,
                ))
            }
            RouteKind::Broadcast => Arc::new(BroadcastRoute::new(invoker)),
            RouteKind::Forking => Arc::new(ForkingRoute::new(route.forks, load_balance, invoker)),
            RouteKind::Pinpoint => Arc::new(PinpointRoute::new(invoker)),
            RouteKind::Condition => Arc::new(ConditionRoute::new(
                predicate(route)?,
                self.build(route.inner)?,
            )),
        })
    }
}

fn predicate(route: &RouteConfig) -> Result<Option<Arc<dyn NodePredicate>>> {
    if route.rules.is_empty() {
        return Ok(None);
    }
    let rules: Arc<dyn NodePredicate> = Arc::new(MethodRules::from_config(&route.rules)?);
    Ok(Some(rules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::adaptive::Rank;
    use crate::config::RouteRuleConfig;
    use crate::invocation::Request;
    use crate::node::{Node, NodeSpec};
    use crate::route::testing::{Script, ScriptedInvoker};

    fn cluster() -> Arc<Cluster> {
        Arc::new(Cluster::from_specs([
            NodeSpec::new("a").with_tag("env", "prod"),
            NodeSpec::new("b").with_tag("env", "canary"),
            NodeSpec::new("c").with_tag("env", "prod"),
        ]))
    }

    fn build(
        config: &ClusterConfig,
        transport: Arc<ScriptedInvoker>,
    ) -> ClusterInvoker<Request, String> {
        ClusterInvoker::from_config(
            config,
            cluster(),
            transport,
            &StrategyRegistry::with_defaults(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_default_path_round_robins_with_failover() {
        let transport = ScriptedInvoker::new(&[("a", Script::Fail(Duration::ZERO))]);
        let invoker = build(&ClusterConfig::default(), transport.clone());
        assert_eq!(invoker.route_name(), "failover");
        assert_eq!(invoker.invoke(Request::new("m")).await.unwrap(), "b");
        assert_eq!(transport.calls(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_selector_chain_applies() {
        let config = ClusterConfig {
            selectors: vec!["tag".into()],
            ..Default::default()
        };
        let transport = ScriptedInvoker::new(&[]);
        let invoker = build(&config, transport.clone());
        let request = Request::new("m").with_attachment("tag", "x");
        // No node carries the tag key "tag"
        let err = invoker.invoke(request).await.unwrap_err();
        assert!(matches!(err, Error::NoNodeAvailable(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_condition_over_broadcast() {
        let mut config = ClusterConfig::default();
        config.route.kind = RouteKind::Condition;
        config.route.inner = RouteKind::Broadcast;
        config.route.rules = vec![RouteRuleConfig {
            method: "user.*".into(),
            tag: Some("env=prod".into()),
            addresses: Vec::new(),
        }];
        let transport = ScriptedInvoker::new(&[]);
        let invoker = build(&config, transport.clone());
        invoker.invoke(Request::new("user.get")).await.unwrap();
        let mut calls = transport.calls();
        calls.sort();
        assert_eq!(calls, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_down_node_never_called() {
        let transport = ScriptedInvoker::new(&[]);
        let mut config = ClusterConfig::default();
        config.route.kind = RouteKind::Broadcast;
        let invoker = build(&config, transport.clone());
        invoker.cluster().apply(crate::cluster::ClusterEvent::Down {
            address: "b".into(),
        });
        invoker.invoke(Request::new("m")).await.unwrap();
        assert!(!transport.calls().contains(&"b".to_string()));
    }

    #[tokio::test]
    async fn test_score_disables_failing_node() {
        let transport = ScriptedInvoker::new(&[("a", Script::Fail(Duration::ZERO))]);
        let mut config = ClusterConfig::default();
        config.load_balance = "adaptive".into();
        config.failover.max_retry = 0;
        let invoker = build(&config, transport.clone());

        for _ in 0..90 {
            let _ = invoker.invoke(Request::new("m")).await;
        }
        let report = invoker.score();
        assert_eq!(report.rank_of("a"), Some(crate::adaptive::Rank::Disabled));

        let before = transport.calls().len();
        for _ in 0..20 {
            invoker.invoke(Request::new("m")).await.unwrap();
        }
        let after = transport.calls();
        assert!(after[before..].iter().all(|a| a != "a"));
    }

    /// Fails calls to `a` until healed
    #[derive(Default)]
    struct Recovering {
        healed: AtomicBool,
        calls: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Invoker<Request, String> for Recovering {
        async fn invoke(&self, node: Arc<Node>, _request: Request) -> Result<String> {
            let address = node.address().to_string();
            self.calls.lock().push(address.clone());
            if address == "a" && !self.healed.load(Ordering::Relaxed) {
                return Err(Error::transport(address, "connection refused", true));
            }
            Ok(address)
        }
    }

    fn adaptive_config(decubation: Duration) -> ClusterConfig {
        let mut config = ClusterConfig::default();
        config.load_balance = "adaptive".into();
        config.failover.max_retry = 0;
        config.adaptive.policy.decubation = decubation;
        config
    }

    async fn disable_a(invoker: &ClusterInvoker<Request, String>) {
        for _ in 0..90 {
            let _ = invoker.invoke(Request::new("m")).await;
        }
        assert_eq!(invoker.score().rank_of("a"), Some(Rank::Disabled));
    }

    #[tokio::test]
    async fn test_disabled_node_recovers_after_probation() {
        let transport = Arc::new(Recovering::default());
        let invoker = ClusterInvoker::from_config(
            &adaptive_config(Duration::from_millis(50)),
            cluster(),
            Arc::clone(&transport) as Arc<dyn Invoker<Request, String>>,
            &StrategyRegistry::with_defaults(),
        )
        .unwrap();
        disable_a(&invoker).await;

        transport.healed.store(true, Ordering::Relaxed);
        tokio::time::sleep(Duration::from_millis(80)).await;
        let report = invoker.score();
        assert_eq!(report.rank_of("a"), Some(Rank::Good));
        assert_eq!(invoker.cluster().get("a").unwrap().weight(), 100);

        let before = transport.calls.lock().len();
        for _ in 0..60 {
            invoker.invoke(Request::new("m")).await.unwrap();
        }
        assert!(transport.calls.lock()[before..].iter().any(|a| a == "a"));
        for _ in 0..3 {
            assert_eq!(invoker.score().rank_of("a"), Some(Rank::Good));
        }
    }

    #[tokio::test]
    async fn test_removed_node_is_readded_clean() {
        let transport = Arc::new(Recovering::default());
        let invoker = ClusterInvoker::from_config(
            &adaptive_config(Duration::from_secs(60)),
            cluster(),
            Arc::clone(&transport) as Arc<dyn Invoker<Request, String>>,
            &StrategyRegistry::with_defaults(),
        )
        .unwrap();
        disable_a(&invoker).await;
        let verdicts = invoker.scorer().verdicts();

        assert!(invoker.apply(ClusterEvent::Remove { address: "a".into() }));
        assert_eq!(verdicts.get("a"), None);
        assert_eq!(invoker.metrics().get("a"), None);

        transport.healed.store(true, Ordering::Relaxed);
        assert!(invoker.apply(ClusterEvent::Add(NodeSpec::new("a"))));
        let before = transport.calls.lock().len();
        for _ in 0..60 {
            invoker.invoke(Request::new("m")).await.unwrap();
        }
        assert!(transport.calls.lock()[before..].iter().any(|a| a == "a"));
    }

    #[tokio::test]
    async fn test_score_prunes_nodes_removed_from_cluster() {
        let transport = ScriptedInvoker::new(&[]);
        let invoker = build(&ClusterConfig::default(), transport);
        for _ in 0..30 {
            invoker.invoke(Request::new("m")).await.unwrap();
        }
        invoker.score();
        assert!(invoker.metrics().get("b").is_some());

        invoker.cluster().apply(ClusterEvent::Remove { address: "b".into() });
        let report = invoker.score();
        assert_eq!(report.scores.len(), 2);
        assert_eq!(invoker.metrics().get("b"), None);
        assert_eq!(invoker.scorer().verdicts().get("b"), None);
    }

    #[tokio::test]
    async fn test_scoring_task_survives_zero_interval() {
        let invoker = Arc::new(build(&ClusterConfig::default(), ScriptedInvoker::new(&[])));
        let (tx, rx) = broadcast::channel(1);
        let handle = invoker.spawn_scoring(Duration::ZERO, rx);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());
        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let config = ClusterConfig {
            load_balance: "least-active".into(),
            ..Default::default()
        };
        let result = ClusterInvoker::<Request, String>::from_config(
            &config,
            cluster(),
            ScriptedInvoker::new(&[]),
            &StrategyRegistry::with_defaults(),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}

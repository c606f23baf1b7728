//! Failover controller integration tests

mod common;

use std::sync::Arc;

use rpc_cluster::Error;
use rpc_cluster::config::FailoverConfig;
use rpc_cluster::invocation::Request;
use rpc_cluster::loadbalance::{LoadBalance, RoundRobin, WeightedRandom};
use rpc_cluster::route::failover::{
    FailoverPolicies, RetryNodeSelector, ReuseRetrySelector, SimpleRetrySelector,
};
use rpc_cluster::route::{FailoverRoute, Route, SingleRoute};

use common::{Behavior, FakeTransport, as_invoker, candidate, ms};

fn failover(
    config: &FailoverConfig,
    transport: &Arc<FakeTransport>,
    load_balance: Arc<dyn LoadBalance>,
    reuse: bool,
) -> FailoverRoute<Request, String> {
    let single: Arc<dyn Route<Request, String>> =
        Arc::new(SingleRoute::new(Arc::clone(&load_balance), as_invoker(transport)));
    let retry_selector: Arc<dyn RetryNodeSelector> = if reuse {
        Arc::new(ReuseRetrySelector)
    } else {
        Arc::new(SimpleRetrySelector)
    };
    FailoverRoute::new(
        FailoverPolicies::from_config(config).unwrap(),
        load_balance,
        retry_selector,
        as_invoker(transport),
        single,
    )
}

#[tokio::test]
async fn test_elimination_with_two_nodes() {
    // A always fails; after A fails the next attempt must land on B
    for _ in 0..30 {
        let transport = FakeTransport::new(&[("A", Behavior::Retryable(ms(0)))]);
        let config = FailoverConfig {
            max_retry: 2,
            ..Default::default()
        };
        let route = failover(&config, &transport, Arc::new(WeightedRandom::new()), false);

        let out = route.route(&candidate(&["A", "B"]), Request::new("get")).await;
        assert_eq!(out.unwrap(), "B");

        let calls = transport.calls();
        if calls[0] == "A" {
            assert_eq!(calls, vec!["A", "B"]);
        } else {
            assert_eq!(calls, vec!["B"]);
        }
    }
}

#[tokio::test]
async fn test_both_failing_never_exceeds_budget() {
    let transport = FakeTransport::new(&[
        ("A", Behavior::Retryable(ms(0))),
        ("B", Behavior::Retryable(ms(0))),
    ]);
    let config = FailoverConfig {
        max_retry: 2,
        ..Default::default()
    };
    let route = failover(&config, &transport, Arc::new(RoundRobin::new()), false);

    let err = route.route(&candidate(&["A", "B"]), Request::new("get")).await.unwrap_err();

    let Error::RetriesExhausted { attempts, source } = err else {
        panic!("expected RetriesExhausted, got {err:?}");
    };
    assert_eq!(attempts, 3);
    assert!(matches!(*source, Error::Transport { retryable: true, .. }));
    assert_eq!(transport.calls().len(), 3);
    // The second attempt never repeats the node that just failed
    let calls = transport.calls();
    assert_ne!(calls[0], calls[1]);
}

#[tokio::test]
async fn test_only_once_per_node_reports_no_alive_node() {
    let transport = FakeTransport::new(&[
        ("A", Behavior::Retryable(ms(0))),
        ("B", Behavior::Retryable(ms(0))),
    ]);
    let config = FailoverConfig {
        max_retry: 2,
        only_once_per_node: true,
        ..Default::default()
    };
    let route = failover(&config, &transport, Arc::new(RoundRobin::new()), false);
    let err = route.route(&candidate(&["A", "B"]), Request::new("get")).await.unwrap_err();
    assert!(matches!(err, Error::NoAliveAfterRetry(_)));
    assert_eq!(transport.calls().len(), 2);
}

#[tokio::test]
async fn test_reuse_selector_retries_full_list() {
    let transport = FakeTransport::new(&[
        ("A", Behavior::Retryable(ms(0))),
        ("B", Behavior::Retryable(ms(0))),
        ("C", Behavior::Retryable(ms(0))),
    ]);
    let config = FailoverConfig {
        max_retry: 5,
        ..Default::default()
    };
    let route = failover(&config, &transport, Arc::new(RoundRobin::new()), true);
    let err = route
        .route(&candidate(&["A", "B", "C"]), Request::new("get"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 6, .. }));
    assert_eq!(transport.calls(), vec!["A", "B", "C", "A", "B", "C"]);
}

#[tokio::test]
async fn test_business_error_passes_through() {
    let transport = FakeTransport::new(&[("A", Behavior::Business(ms(0)))]);
    let route = failover(
        &FailoverConfig::default(),
        &transport,
        Arc::new(RoundRobin::new()),
        false,
    );
    let err = route.route(&candidate(&["A", "B"]), Request::new("get")).await.unwrap_err();
    assert!(err.is_business());
    assert_eq!(transport.calls(), vec!["A"]);
}

#[tokio::test]
async fn test_method_override_disables_retry() {
    let transport = FakeTransport::new(&[("A", Behavior::Retryable(ms(0)))]);
    let config: FailoverConfig = serde_yaml::from_str(
        r#"
max_retry: 3
methods:
  - method: "*.delete"
    max_retry: 0
"#,
    )
    .unwrap();
    let route = failover(&config, &transport, Arc::new(RoundRobin::new()), false);
    let err = route
        .route(&candidate(&["A", "B"]), Request::new("user.delete"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport { .. }));
    assert_eq!(transport.calls(), vec!["A"]);
}

#[tokio::test]
async fn test_backoff_spaces_attempts() {
    let transport = FakeTransport::new(&[("A", Behavior::Retryable(ms(0)))]);
    let config: FailoverConfig = serde_yaml::from_str(
        r#"
max_retry: 2
backoff:
  enabled: true
  initial: 30ms
  max: 30ms
"#,
    )
    .unwrap();
    let route = failover(&config, &transport, Arc::new(RoundRobin::new()), false);
    let started = std::time::Instant::now();
    let err = route.route(&candidate(&["A"]), Request::new("get")).await.unwrap_err();
    assert!(matches!(err, Error::RetriesExhausted { attempts: 3, .. }));
    assert!(started.elapsed() >= ms(60));
}

//! Failover controller
//!
//! Wraps a single-node dispatch in a retry loop. Each attempt picks a node
//! with the load balance and calls it. A failure is classified by the
//! [`ExceptionPolicy`], checked against the [`DeadlinePolicy`] and the retry
//! budget, and the [`RetryNodeSelector`] decides which nodes the next attempt
//! may use. With a zero retry budget the controller steps aside and the inner
//! topology runs once.

mod policy;
mod retry_selector;

pub use policy::{
    BackoffPolicy, Deadline, DeadlinePolicy, ExceptionPolicy, FailoverPolicies, FailoverPolicy,
};
pub use retry_selector::{RetryNodeSelector, RetryState, ReuseRetrySelector, SimpleRetrySelector};

use std::sync::Arc;

use async_trait::async_trait;
use telemetry_metrics::counter;
use tracing::{debug, warn};

use super::{Invoker, Route, RouteRequest};
use crate::loadbalance::LoadBalance;
use crate::node::Candidate;
use crate::{Error, Result};

/// Retrying dispatch over a candidate
pub struct FailoverRoute<Req, Resp> {
    policies: FailoverPolicies,
    load_balance: Arc<dyn LoadBalance>,
    retry_selector: Arc<dyn RetryNodeSelector>,
    invoker: Arc<dyn Invoker<Req, Resp>>,
    inner: Arc<dyn Route<Req, Resp>>,
}

impl<Req, Resp> FailoverRoute<Req, Resp> {
    /// Create the controller
    ///
    /// `inner` runs alone whenever the resolved policy allows no retries.
    #[must_use]
    pub fn new(
        policies: FailoverPolicies,
        load_balance: Arc<dyn LoadBalance>,
        retry_selector: Arc<dyn RetryNodeSelector>,
        invoker: Arc<dyn Invoker<Req, Resp>>,
        inner: Arc<dyn Route<Req, Resp>>,
    ) -> Self {
        Self {
            policies,
            load_balance,
            retry_selector,
            invoker,
            inner,
        }
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for FailoverRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        let policy = self.policies.resolve(request.method());
        if policy.max_retry == 0 {
            return self.inner.route(candidate, request).await;
        }
        if candidate.is_empty() {
            return Err(Error::NoNodeAvailable(format!(
                "{}: empty candidate",
                request.method()
            )));
        }

        let mut deadline = policy.deadline.start();
        let mut delays = policy.backoff.map(|b| b.delays(policy.max_retry));
        let mut state = RetryState::new(candidate.clone());
        let mut current = candidate.clone();

        loop {
            let (node, outcome) = match self.load_balance.select(&current, &request) {
                Ok(node) => {
                    let outcome = self.invoker.invoke(Arc::clone(&node), request.clone()).await;
                    (Some(node), outcome)
                }
                Err(e) => (None, Err(e)),
            };

            let error = match outcome {
                Ok(resp) => {
                    if state.attempt() > 0 {
                        debug!(
                            method = request.method(),
                            attempt = state.attempt(),
                            "Failover recovered"
                        );
                    }
                    return Ok(resp);
                }
                Err(e) => e,
            };

            if deadline.expired() {
                let err = deadline.exceeded();
                warn!(
                    method = request.method(),
                    attempt = state.attempt(),
                    error = %error,
                    "Failover deadline exceeded"
                );
                counter!("rpc_cluster_failures_total", "reason" => err.reason()).increment(1);
                return Err(err);
            }

            if !policy.exception.is_retryable(&error) {
                debug!(method = request.method(), error = %error, "Failure not retryable");
                return Err(error);
            }

            if state.attempt() >= policy.max_retry {
                warn!(
                    method = request.method(),
                    attempts = state.attempt() + 1,
                    error = %error,
                    "Failover retries exhausted"
                );
                let err = Error::RetriesExhausted {
                    attempts: state.attempt() + 1,
                    source: Box::new(error),
                };
                counter!("rpc_cluster_failures_total", "reason" => err.reason()).increment(1);
                return Err(err);
            }

            if current.len() == 1 && policy.only_once_per_node {
                let err = Error::NoAliveAfterRetry(format!(
                    "{}: {} was the last node left",
                    request.method(),
                    current[0].address()
                ));
                counter!("rpc_cluster_failures_total", "reason" => err.reason()).increment(1);
                return Err(err);
            }

            current = self.retry_selector.select(&state, node.as_ref(), &current);
            if policy.deadline.reset_on_retry {
                deadline.reset();
            }
            state.advance();
            counter!("rpc_cluster_retries_total").increment(1);
            debug!(
                method = request.method(),
                node = node.as_ref().map_or("-", |n| n.address()),
                attempt = state.attempt(),
                remaining = current.len(),
                error = %error,
                "Retrying"
            );

            if let Some(delay) = delays.as_mut().and_then(Iterator::next) {
                tokio::time::sleep(delay).await;
            }
        }
    }

    fn name(&self) -> &'static str {
        "failover"
    }
}

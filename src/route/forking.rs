//! Forking topology: race a bounded subset of nodes

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::debug;

use super::{Invoker, Route, RouteRequest};
use crate::invocation::Invocation;
use crate::loadbalance::LoadBalance;
use crate::node::{Candidate, Node};
use crate::{Error, Result};

/// Calls up to `forks` nodes concurrently; the first success wins
///
/// When `forks` is smaller than the candidate, nodes are drawn one by one with
/// the load balance from a pool that shrinks after every draw, so no node is
/// called twice. Calls still in flight after a winner are left to finish in
/// the background.
pub struct ForkingRoute<Req, Resp> {
    forks: usize,
    load_balance: Arc<dyn LoadBalance>,
    invoker: Arc<dyn Invoker<Req, Resp>>,
}

impl<Req, Resp> ForkingRoute<Req, Resp> {
    /// Fan out to at most `forks` nodes (at least one)
    #[must_use]
    pub fn new(
        forks: usize,
        load_balance: Arc<dyn LoadBalance>,
        invoker: Arc<dyn Invoker<Req, Resp>>,
    ) -> Self {
        Self {
            forks: forks.max(1),
            load_balance,
            invoker,
        }
    }

    fn choose(&self, candidate: &Candidate, request: &dyn Invocation) -> Result<Vec<Arc<Node>>> {
        let n = self.forks.min(candidate.len());
        if n == candidate.len() {
            return Ok(candidate.nodes().to_vec());
        }
        if n == 1 {
            return Ok(vec![self.load_balance.select(candidate, request)?]);
        }

        let mut pool = candidate.clone();
        let mut chosen = Vec::with_capacity(n);
        while chosen.len() < n {
            match self.load_balance.select(&pool, request) {
                Ok(node) => {
                    pool = pool.exclude(node.address());
                    chosen.push(node);
                }
                Err(e) if chosen.is_empty() => return Err(e),
                Err(_) => break,
            }
        }
        Ok(chosen)
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for ForkingRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        if candidate.is_empty() {
            return Err(Error::NoAliveProvider(format!(
                "{}: forking over empty candidate",
                request.method()
            )));
        }
        let chosen = self
            .choose(candidate, &request)
            .map_err(|e| Error::NoAliveProvider(format!("{}: {e}", request.method())))?;
        debug!(forks = chosen.len(), method = request.method(), "Forking");

        let mut pending: FuturesUnordered<_> = chosen
            .into_iter()
            .map(|node| {
                let invoker = Arc::clone(&self.invoker);
                let request = request.clone();
                tokio::spawn(async move { invoker.invoke(node, request).await })
            })
            .collect();

        let mut last_error = None;
        while let Some(joined) = pending.next().await {
            let outcome = joined
                .unwrap_or_else(|e| Err(Error::Internal(format!("forking task failed: {e}"))));
            match outcome {
                Ok(resp) => return Ok(resp),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::Internal("forking produced no outcome".into())))
    }

    fn name(&self) -> &'static str {
        "forking"
    }
}

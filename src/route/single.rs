//! Single-node topology

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Invoker, Route, RouteRequest};
use crate::loadbalance::LoadBalance;
use crate::node::Candidate;
use crate::{Error, Result};

/// Picks one node with the load balance and calls it
pub struct SingleRoute<Req, Resp> {
    load_balance: Arc<dyn LoadBalance>,
    invoker: Arc<dyn Invoker<Req, Resp>>,
}

impl<Req, Resp> SingleRoute<Req, Resp> {
    /// Create the topology
    #[must_use]
    pub fn new(load_balance: Arc<dyn LoadBalance>, invoker: Arc<dyn Invoker<Req, Resp>>) -> Self {
        Self {
            load_balance,
            invoker,
        }
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for SingleRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        let node = self
            .load_balance
            .select(candidate, &request)
            .map_err(|e| Error::NoAliveProvider(format!("{}: {e}", request.method())))?;
        debug!(node = %node.address(), method = request.method(), "Single dispatch");
        self.invoker.invoke(node, request).await
    }

    fn name(&self) -> &'static str {
        "single"
    }
}

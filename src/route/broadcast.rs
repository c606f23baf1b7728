//! Broadcast topology: call every node in the candidate

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};

use super::{Invoker, Route, RouteRequest};
use crate::node::Candidate;
use crate::{Error, Result};

/// Sends the request to every node concurrently and waits for all of them
///
/// The outcome is the first failure in candidate order, or the last success
/// when every call succeeded.
pub struct BroadcastRoute<Req, Resp> {
    invoker: Arc<dyn Invoker<Req, Resp>>,
}

impl<Req, Resp> BroadcastRoute<Req, Resp> {
    /// Create the topology
    #[must_use]
    pub fn new(invoker: Arc<dyn Invoker<Req, Resp>>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for BroadcastRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        if candidate.is_empty() {
            return Err(Error::NoAliveProvider(format!(
                "{}: broadcast over empty candidate",
                request.method()
            )));
        }
        debug!(nodes = candidate.len(), method = request.method(), "Broadcasting");

        let handles = candidate.iter().map(|node| {
            let invoker = Arc::clone(&self.invoker);
            let node = Arc::clone(node);
            let request = request.clone();
            tokio::spawn(async move { invoker.invoke(node, request).await })
        });

        let joined = join_all(handles).await;
        let mut last = None;
        let mut first_error = None;
        for (node, joined) in candidate.iter().zip(joined) {
            let outcome = joined.map_err(|e| Error::Internal(format!("broadcast task failed: {e}")))?;
            match outcome {
                Ok(resp) => last = Some(resp),
                Err(e) => {
                    warn!(node = %node.address(), error = %e, "Broadcast call failed");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match (first_error, last) {
            (Some(e), _) => Err(e),
            (None, Some(resp)) => Ok(resp),
            (None, None) => Err(Error::Internal("broadcast produced no outcome".into())),
        }
    }

    fn name(&self) -> &'static str {
        "broadcast"
    }
}

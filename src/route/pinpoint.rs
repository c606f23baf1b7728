//! Pinpoint topology: call the node named by the request

use std::sync::Arc;

use async_trait::async_trait;

use super::{Invoker, Route, RouteRequest};
use crate::invocation::PINPOINT_KEY;
use crate::node::Candidate;
use crate::{Error, Result};

/// Sends the request to the node whose address is in the `pinpoint` attachment
pub struct PinpointRoute<Req, Resp> {
    invoker: Arc<dyn Invoker<Req, Resp>>,
}

impl<Req, Resp> PinpointRoute<Req, Resp> {
    /// Create the topology
    #[must_use]
    pub fn new(invoker: Arc<dyn Invoker<Req, Resp>>) -> Self {
        Self { invoker }
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for PinpointRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        let Some(target) = request.attachment(PINPOINT_KEY) else {
            return Err(Error::Config(format!(
                "{}: pinpoint route requires the '{PINPOINT_KEY}' attachment",
                request.method()
            )));
        };
        let node = candidate
            .find(target)
            .cloned()
            .ok_or_else(|| Error::NoAliveProvider(format!("pinpoint target {target} is not alive")))?;
        self.invoker.invoke(node, request).await
    }

    fn name(&self) -> &'static str {
        "pinpoint"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Request;
    use crate::route::testing::{ScriptedInvoker, candidate};

    #[tokio::test]
    async fn test_calls_named_node() {
        let invoker = ScriptedInvoker::new(&[]);
        let route = PinpointRoute::new(invoker.clone());
        let out = route
            .route(&candidate(&["a", "b", "c"]), Request::new("m").pinned_to("c"))
            .await;
        assert_eq!(out.unwrap(), "c");
        assert_eq!(invoker.calls(), vec!["c"]);
    }

    #[tokio::test]
    async fn test_missing_target_is_config_error() {
        let route = PinpointRoute::new(ScriptedInvoker::new(&[]));
        let err = route.route(&candidate(&["a"]), Request::new("m")).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn test_absent_target_is_no_alive_provider() {
        let invoker = ScriptedInvoker::new(&[]);
        let route = PinpointRoute::new(invoker.clone());
        let err = route
            .route(&candidate(&["a"]), Request::new("m").pinned_to("z"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoAliveProvider(_)));
        assert!(invoker.calls().is_empty());
    }
}

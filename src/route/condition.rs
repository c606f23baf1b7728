//! Condition topology: filter the candidate with a predicate, then delegate

use std::sync::Arc;

use async_trait::async_trait;
use glob::Pattern;
use tracing::debug;

use super::{Route, RouteRequest};
use crate::config::RouteRuleConfig;
use crate::invocation::Invocation;
use crate::node::{Candidate, Node};
use crate::{Error, Result};

/// Decides whether a node may serve a request
pub trait NodePredicate: Send + Sync {
    /// `true` keeps the node
    fn test(&self, node: &Node, request: &dyn Invocation) -> bool;
}

impl<F> NodePredicate for F
where
    F: Fn(&Node, &dyn Invocation) -> bool + Send + Sync,
{
    fn test(&self, node: &Node, request: &dyn Invocation) -> bool {
        self(node, request)
    }
}

/// One routing rule scoped to methods matching a glob
#[derive(Debug, Clone)]
pub struct MethodRule {
    method: Pattern,
    tag: Option<(String, String)>,
    addresses: Vec<String>,
}

impl MethodRule {
    /// Build a rule from configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid glob or a tag without `=`.
    pub fn from_config(config: &RouteRuleConfig) -> Result<Self> {
        let method = Pattern::new(&config.method)
            .map_err(|e| Error::Config(format!("invalid method pattern '{}': {e}", config.method)))?;
        let tag = config
            .tag
            .as_deref()
            .map(|t| {
                t.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .ok_or_else(|| Error::Config(format!("tag condition '{t}' must be key=value")))
            })
            .transpose()?;
        Ok(Self {
            method,
            tag,
            addresses: config.addresses.clone(),
        })
    }

    /// Whether this rule governs `method`
    #[must_use]
    pub fn applies_to(&self, method: &str) -> bool {
        self.method.matches(method)
    }

    fn accepts(&self, node: &Node) -> bool {
        let tag_ok = self
            .tag
            .as_ref()
            .is_none_or(|(k, v)| node.tag(k) == Some(v.as_str()));
        let address_ok =
            self.addresses.is_empty() || self.addresses.iter().any(|a| a == node.address());
        tag_ok && address_ok
    }
}

/// Conjunction of the rules whose method glob matches the request
///
/// Requests matched by no rule keep every node.
#[derive(Debug, Clone, Default)]
pub struct MethodRules {
    rules: Vec<MethodRule>,
}

impl MethodRules {
    /// Wrap parsed rules
    #[must_use]
    pub fn new(rules: Vec<MethodRule>) -> Self {
        Self { rules }
    }

    /// Parse every configured rule
    ///
    /// # Errors
    ///
    /// Fails on the first invalid rule.
    pub fn from_config(configs: &[RouteRuleConfig]) -> Result<Self> {
        configs
            .iter()
            .map(MethodRule::from_config)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Number of rules
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// No rules configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl NodePredicate for MethodRules {
    fn test(&self, node: &Node, request: &dyn Invocation) -> bool {
        self.rules
            .iter()
            .filter(|r| r.applies_to(request.method()))
            .all(|r| r.accepts(node))
    }
}

/// Narrows the candidate with a predicate before handing it to `inner`
pub struct ConditionRoute<Req, Resp> {
    predicate: Option<Arc<dyn NodePredicate>>,
    inner: Arc<dyn Route<Req, Resp>>,
}

impl<Req, Resp> ConditionRoute<Req, Resp> {
    /// Filter with `predicate`; `None` passes the candidate through
    #[must_use]
    pub fn new(predicate: Option<Arc<dyn NodePredicate>>, inner: Arc<dyn Route<Req, Resp>>) -> Self {
        Self { predicate, inner }
    }
}

#[async_trait]
impl<Req, Resp> Route<Req, Resp> for ConditionRoute<Req, Resp>
where
    Req: RouteRequest,
    Resp: Send + 'static,
{
    async fn route(&self, candidate: &Candidate, request: Req) -> Result<Resp> {
        let filtered = match &self.predicate {
            Some(predicate) => candidate.retain(|n| predicate.test(n, &request)),
            None => candidate.clone(),
        };
        debug!(
            before = candidate.len(),
            after = filtered.len(),
            inner = self.inner.name(),
            "Condition filter applied"
        );
        self.inner.route(&filtered, request).await
    }

    fn name(&self) -> &'static str {
        "condition"
    }
}

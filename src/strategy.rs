//! Named strategy factories
//!
//! Configuration refers to load balances, selectors, retry selectors, judges
//! and arbiters by name. A [`StrategyRegistry`] resolves those names once, when
//! a [`crate::ClusterInvoker`] is assembled. Custom strategies are added by
//! registering another factory under a new name.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::adaptive::{
    Arbiter, AvailabilityJudge, ConcurrencyJudge, Judge, OverallArbiter, ResponseTimeJudge,
    Verdicts, WeightArbiter,
};
use crate::config::ClusterConfig;
use crate::loadbalance::{AdaptiveLoadBalance, LoadBalance, RoundRobin, WeightedRandom};
use crate::route::failover::{RetryNodeSelector, ReuseRetrySelector, SimpleRetrySelector};
use crate::selector::{NodeSelector, NoopSelector, SimpleSelector, TagSelector};
use crate::{Error, Result};

/// Inputs available to factories
pub struct BuildContext<'a> {
    /// Interface configuration
    pub config: &'a ClusterConfig,
    /// Verdict table shared by the scorer and the adaptive load balance
    pub verdicts: &'a Arc<Verdicts>,
}

type Factory<T> = Arc<dyn Fn(&BuildContext<'_>) -> Arc<T> + Send + Sync>;

fn lookup<T: ?Sized>(
    kind: &str,
    map: &BTreeMap<String, Factory<T>>,
    name: &str,
) -> Result<Factory<T>> {
    map.get(name).cloned().ok_or_else(|| {
        let known: Vec<&str> = map.keys().map(String::as_str).collect();
        Error::Config(format!(
            "unknown {kind} '{name}', expected one of: {}",
            known.join(", ")
        ))
    })
}

/// Name to factory maps for every pluggable strategy
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    load_balances: BTreeMap<String, Factory<dyn LoadBalance>>,
    selectors: BTreeMap<String, Factory<dyn NodeSelector>>,
    retry_selectors: BTreeMap<String, Factory<dyn RetryNodeSelector>>,
    judges: BTreeMap<String, Factory<dyn Judge>>,
    arbiters: BTreeMap<String, Factory<dyn Arbiter>>,
}

impl StrategyRegistry {
    /// Registry without any strategy
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in strategy
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();

        registry.register_load_balance("round-robin", |_| Arc::new(RoundRobin::new()));
        registry.register_load_balance("random", |_| Arc::new(WeightedRandom::new()));
        registry.register_load_balance("adaptive", |ctx| {
            Arc::new(AdaptiveLoadBalance::new(Arc::clone(ctx.verdicts)))
        });

        registry.register_selector("noop", |_| Arc::new(NoopSelector));
        registry.register_selector("tag", |ctx| {
            let tag = &ctx.config.tag;
            Arc::new(TagSelector::new(tag.key.clone(), tag.value.clone()))
        });
        registry.register_selector("simple", |ctx| {
            Arc::new(SimpleSelector::new(ctx.config.simple.size))
        });

        registry.register_retry_selector("simple", |_| Arc::new(SimpleRetrySelector));
        registry.register_retry_selector("all", |_| Arc::new(ReuseRetrySelector));

        registry.register_judge("availability", |_| Arc::new(AvailabilityJudge));
        registry.register_judge("response-time", |_| Arc::new(ResponseTimeJudge));
        registry.register_judge("concurrency", |_| Arc::new(ConcurrencyJudge));

        registry.register_arbiter("weight", |_| Arc::new(WeightArbiter));
        registry.register_arbiter("overall", |_| Arc::new(OverallArbiter));

        registry
    }

    /// Register a load balance factory, replacing any with the same name
    pub fn register_load_balance<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BuildContext<'_>) -> Arc<dyn LoadBalance> + Send + Sync + 'static,
    {
        self.load_balances.insert(name.into(), Arc::new(factory));
    }

    /// Register a node selector factory
    pub fn register_selector<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BuildContext<'_>) -> Arc<dyn NodeSelector> + Send + Sync + 'static,
    {
        self.selectors.insert(name.into(), Arc::new(factory));
    }

    /// Register a retry node selector factory
    pub fn register_retry_selector<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BuildContext<'_>) -> Arc<dyn RetryNodeSelector> + Send + Sync + 'static,
    {
        self.retry_selectors.insert(name.into(), Arc::new(factory));
    }

    /// Register a judge factory
    pub fn register_judge<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BuildContext<'_>) -> Arc<dyn Judge> + Send + Sync + 'static,
    {
        self.judges.insert(name.into(), Arc::new(factory));
    }

    /// Register an arbiter factory
    pub fn register_arbiter<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&BuildContext<'_>) -> Arc<dyn Arbiter> + Send + Sync + 'static,
    {
        self.arbiters.insert(name.into(), Arc::new(factory));
    }

    /// Build the load balance called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn load_balance(&self, name: &str, ctx: &BuildContext<'_>) -> Result<Arc<dyn LoadBalance>> {
        Ok(lookup("load balance", &self.load_balances, name)?(ctx))
    }

    /// Build the selector called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn selector(&self, name: &str, ctx: &BuildContext<'_>) -> Result<Arc<dyn NodeSelector>> {
        Ok(lookup("selector", &self.selectors, name)?(ctx))
    }

    /// Build the retry selector called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn retry_selector(
        &self,
        name: &str,
        ctx: &BuildContext<'_>,
    ) -> Result<Arc<dyn RetryNodeSelector>> {
        Ok(lookup("retry selector", &self.retry_selectors, name)?(ctx))
    }

    /// Build the judge called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn judge(&self, name: &str, ctx: &BuildContext<'_>) -> Result<Arc<dyn Judge>> {
        Ok(lookup("judge", &self.judges, name)?(ctx))
    }

    /// Build the arbiter called `name`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn arbiter(&self, name: &str, ctx: &BuildContext<'_>) -> Result<Arc<dyn Arbiter>> {
        Ok(lookup("arbiter", &self.arbiters, name)?(ctx))
    }

    /// Fail unless a load balance called `name` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn check_load_balance(&self, name: &str) -> Result<()> {
        lookup("load balance", &self.load_balances, name).map(drop)
    }

    /// Fail unless a selector called `name` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn check_selector(&self, name: &str) -> Result<()> {
        lookup("selector", &self.selectors, name).map(drop)
    }

    /// Fail unless a retry selector called `name` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn check_retry_selector(&self, name: &str) -> Result<()> {
        lookup("retry selector", &self.retry_selectors, name).map(drop)
    }

    /// Fail unless a judge called `name` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn check_judge(&self, name: &str) -> Result<()> {
        lookup("judge", &self.judges, name).map(drop)
    }

    /// Fail unless an arbiter called `name` exists
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an unknown name.
    pub fn check_arbiter(&self, name: &str) -> Result<()> {
        lookup("arbiter", &self.arbiters, name).map(drop)
    }

    /// Registered names per strategy kind
    #[must_use]
    pub fn names(&self) -> BTreeMap<&'static str, Vec<String>> {
        BTreeMap::from([
            ("load_balance", self.load_balances.keys().cloned().collect()),
            ("selector", self.selectors.keys().cloned().collect()),
            ("retry_selector", self.retry_selectors.keys().cloned().collect()),
            ("judge", self.judges.keys().cloned().collect()),
            ("arbiter", self.arbiters.keys().cloned().collect()),
        ])
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("names", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::Request;
    use crate::node::{Candidate, Node, NodeSpec};

    fn ctx_parts() -> (ClusterConfig, Arc<Verdicts>) {
        (ClusterConfig::default(), Arc::new(Verdicts::new()))
    }

    #[test]
    fn test_defaults_resolve_by_name() {
        let registry = StrategyRegistry::with_defaults();
        let (config, verdicts) = ctx_parts();
        let ctx = BuildContext {
            config: &config,
            verdicts: &verdicts,
        };
        for name in ["round-robin", "random", "adaptive"] {
            assert_eq!(registry.load_balance(name, &ctx).unwrap().name(), name);
        }
        for name in ["noop", "tag", "simple"] {
            assert_eq!(registry.selector(name, &ctx).unwrap().name(), name);
        }
        for name in ["simple", "all"] {
            assert_eq!(registry.retry_selector(name, &ctx).unwrap().name(), name);
        }
        for name in ["availability", "response-time", "concurrency"] {
            assert_eq!(registry.judge(name, &ctx).unwrap().name(), name);
        }
        for name in ["weight", "overall"] {
            assert_eq!(registry.arbiter(name, &ctx).unwrap().name(), name);
        }
    }

    #[test]
    fn test_unknown_name_lists_known() {
        let registry = StrategyRegistry::with_defaults();
        let err = registry.check_load_balance("least-active").unwrap_err();
        let Error::Config(message) = err else {
            panic!("expected config error");
        };
        assert!(message.contains("adaptive, random, round-robin"));
    }

    #[test]
    fn test_selector_factory_reads_config() {
        let registry = StrategyRegistry::with_defaults();
        let (mut config, verdicts) = ctx_parts();
        config.simple.size = 2;
        let ctx = BuildContext {
            config: &config,
            verdicts: &verdicts,
        };
        let selector = registry.selector("simple", &ctx).unwrap();
        let candidate: Candidate = (0..5)
            .map(|i| Arc::new(Node::new(NodeSpec::new(format!("n{i}")))))
            .collect();
        assert_eq!(selector.select(&candidate, &Request::new("m")).len(), 2);
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = StrategyRegistry::empty();
        assert!(registry.check_selector("noop").is_err());
        registry.register_selector("noop", |_| Arc::new(NoopSelector));
        assert!(registry.check_selector("noop").is_ok());
    }
}

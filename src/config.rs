//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::adaptive::AdaptivePolicy;
use crate::invocation::TAG_KEY;
use crate::node::NodeSpec;
use crate::route::MethodRules;
use crate::route::failover::FailoverPolicies;
use crate::strategy::StrategyRegistry;
use crate::{Error, Result};

/// Configuration of one clustered service interface
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Interface name, used in logs
    pub name: String,
    /// Load balance strategy name
    pub load_balance: String,
    /// Selector chain, applied in order
    pub selectors: Vec<String>,
    /// Tag selector settings
    pub tag: TagConfig,
    /// Fixed-window selector settings
    pub simple: SimpleConfig,
    /// Dispatch topology
    pub route: RouteConfig,
    /// Failover controller
    pub failover: FailoverConfig,
    /// Adaptive scoring
    pub adaptive: AdaptiveConfig,
    /// Simulated cluster for the CLI
    pub simulation: SimulationConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            load_balance: "round-robin".to_string(),
            selectors: Vec::new(),
            tag: TagConfig::default(),
            simple: SimpleConfig::default(),
            route: RouteConfig::default(),
            failover: FailoverConfig::default(),
            adaptive: AdaptiveConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from file and environment
    ///
    /// Environment variables use the `RPC_CLUSTER_` prefix with `__` as the
    /// nesting separator (`RPC_CLUSTER_FAILOVER__MAX_RETRY=3`).
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("RPC_CLUSTER_").split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Effective configuration rendered as YAML
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(format!("yaml: {e}")))
    }

    /// Check the configuration against the built-in strategies
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&StrategyRegistry::with_defaults())
    }

    /// Check the configuration against `registry`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first problem found.
    pub fn validate_with(&self, registry: &StrategyRegistry) -> Result<()> {
        registry.check_load_balance(&self.load_balance)?;
        for selector in &self.selectors {
            registry.check_selector(selector)?;
        }
        registry.check_retry_selector(&self.failover.retry_selector)?;
        for judge in &self.adaptive.judges {
            registry.check_judge(judge)?;
        }
        for arbiter in &self.adaptive.arbiters {
            registry.check_arbiter(arbiter)?;
        }

        if self.simple.size == 0 {
            return Err(Error::Config("simple.size must be at least 1".into()));
        }
        if self.adaptive.interval.is_zero() {
            return Err(Error::Config("adaptive.interval must be positive".into()));
        }
        if self.route.kind == RouteKind::Forking && self.route.forks == 0 {
            return Err(Error::Config("route.forks must be at least 1".into()));
        }
        if self.route.kind == RouteKind::Condition {
            if matches!(self.route.inner, RouteKind::Condition | RouteKind::Pinpoint) {
                return Err(Error::Config(format!(
                    "route.inner must be single, broadcast or forking, got {:?}",
                    self.route.inner
                )));
            }
            if self.route.inner == RouteKind::Forking && self.route.forks == 0 {
                return Err(Error::Config("route.forks must be at least 1".into()));
            }
        }
        MethodRules::from_config(&self.route.rules)?;
        FailoverPolicies::from_config(&self.failover)?;
        if self.failover.backoff.enabled && self.failover.backoff.factor < 1.0 {
            return Err(Error::Config("failover.backoff.factor must be >= 1.0".into()));
        }
        for node in &self.simulation.nodes {
            for (label, rate) in [
                ("failure_rate", node.failure_rate),
                ("business_error_rate", node.business_error_rate),
            ] {
                if !(0.0..=1.0).contains(&rate) {
                    return Err(Error::Config(format!(
                        "simulation node {}: {label} must be within 0..=1",
                        node.node.address
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Tag selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TagConfig {
    /// Tag key, also the attachment key read from requests
    pub key: String,
    /// Static value used when the request carries none
    pub value: Option<String>,
}

impl Default for TagConfig {
    fn default() -> Self {
        Self {
            key: TAG_KEY.to_string(),
            value: None,
        }
    }
}

/// Fixed-window selector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleConfig {
    /// Window size
    pub size: usize,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self { size: 3 }
    }
}

/// Dispatch topology kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// One node via the load balance
    #[default]
    Single,
    /// Every node
    Broadcast,
    /// Race a bounded subset
    Forking,
    /// Node named by the request
    Pinpoint,
    /// Filter with rules, then delegate to `inner`
    Condition,
}

/// Topology configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Topology
    pub kind: RouteKind,
    /// Parallel calls for forking
    pub forks: usize,
    /// Delegate topology for condition routing
    pub inner: RouteKind,
    /// Condition rules
    pub rules: Vec<RouteRuleConfig>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            kind: RouteKind::Single,
            forks: 2,
            inner: RouteKind::Single,
            rules: Vec::new(),
        }
    }
}

/// One condition rule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRuleConfig {
    /// Method glob the rule applies to
    pub method: String,
    /// Required node tag, as `key=value`
    pub tag: Option<String>,
    /// Allowed node addresses, empty allows all
    pub addresses: Vec<String>,
}

/// Failover controller configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Retries after the first attempt, 0 disables failover
    pub max_retry: u32,
    /// Fail instead of retrying once a single node remains
    pub only_once_per_node: bool,
    /// Retry node selector name
    pub retry_selector: String,
    /// Business error codes that may be retried
    pub retry_codes: Vec<String>,
    /// Total request deadline, 0 disables it
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Restart the deadline window on every retry
    pub reset_timeout_on_retry: bool,
    /// Delay between attempts
    pub backoff: BackoffConfig,
    /// Per-method overrides, first match wins
    pub methods: Vec<MethodFailoverConfig>,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            max_retry: 2,
            only_once_per_node: false,
            retry_selector: "simple".to_string(),
            retry_codes: Vec::new(),
            timeout: Duration::from_secs(5),
            reset_timeout_on_retry: false,
            backoff: BackoffConfig::default(),
            methods: Vec::new(),
        }
    }
}

/// Exponential backoff between failover attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Sleep between attempts
    pub enabled: bool,
    /// First delay
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// Delay cap
    #[serde(with = "humantime_serde")]
    pub max: Duration,
    /// Growth factor
    pub factor: f32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            initial: Duration::from_millis(50),
            max: Duration::from_secs(1),
            factor: 2.0,
        }
    }
}

/// Failover override for methods matching a glob
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodFailoverConfig {
    /// Method glob
    pub method: String,
    /// Overrides `max_retry`
    pub max_retry: Option<u32>,
    /// Overrides `only_once_per_node`
    pub only_once_per_node: Option<bool>,
}

/// Adaptive scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveConfig {
    /// Scoring tunables
    pub policy: AdaptivePolicy,
    /// Enabled judges
    pub judges: Vec<String>,
    /// Enabled arbiters
    pub arbiters: Vec<String>,
    /// Scoring cadence used by the simulator
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            policy: AdaptivePolicy::default(),
            judges: vec![
                "availability".to_string(),
                "response-time".to_string(),
                "concurrency".to_string(),
            ],
            arbiters: vec!["weight".to_string(), "overall".to_string()],
            interval: Duration::from_secs(1),
        }
    }
}

/// Simulated cluster driven by the `simulate` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Simulated nodes
    pub nodes: Vec<SimNodeConfig>,
    /// Requests to send
    pub requests: usize,
    /// Requests in flight at once
    pub concurrency: usize,
    /// Method name put on every request
    pub method: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            requests: 1_000,
            concurrency: 16,
            method: "echo".to_string(),
        }
    }
}

/// One simulated node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimNodeConfig {
    /// Identity, weight and tags
    #[serde(flatten)]
    pub node: NodeSpec,
    /// Probability of a retryable transport failure
    #[serde(default)]
    pub failure_rate: f64,
    /// Probability of a business error
    #[serde(default)]
    pub business_error_rate: f64,
    /// Business error code returned by the node
    #[serde(default = "default_business_code")]
    pub business_code: String,
    /// Simulated response latency
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
}

fn default_business_code() -> String {
    "E_BUSINESS".to_string()
}

/// Humantime serialization for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s", "250ms")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(s.trim()).map_err(serde::de::Error::custom)
    }

    /// Parse "30s", "5m", "100ms" or bare seconds
    ///
    /// # Errors
    ///
    /// Returns the integer parse error for malformed input.
    pub fn parse(s: &str) -> Result<Duration, std::num::ParseIntError> {
        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.trim().parse::<u64>().map(Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.trim().parse::<u64>().map(Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            mins.trim()
                .parse::<u64>()
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
        } else {
            s.parse::<u64>().map(Duration::from_secs)
        }
    }
}

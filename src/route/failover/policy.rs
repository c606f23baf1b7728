//! Failover policies: retry budget, retryable errors, deadline, backoff

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use backon::{BackoffBuilder, ExponentialBuilder};
use glob::Pattern;

use crate::config::{BackoffConfig, FailoverConfig};
use crate::{Error, Result};

/// Decides which failures may be retried
#[derive(Debug, Clone, Default)]
pub struct ExceptionPolicy {
    retry_codes: Arc<HashSet<String>>,
}

impl ExceptionPolicy {
    /// Retry business errors whose code is in `codes`
    pub fn new(codes: impl IntoIterator<Item = String>) -> Self {
        Self {
            retry_codes: Arc::new(codes.into_iter().collect()),
        }
    }

    /// Whether `error` may be retried
    ///
    /// Transport failures carry their own flag. An empty pick and I/O errors
    /// are always retryable. Business errors are retryable only for the
    /// configured codes; every other error is terminal.
    #[must_use]
    pub fn is_retryable(&self, error: &Error) -> bool {
        match error {
            Error::Transport { retryable, .. } => *retryable,
            Error::NoNodeAvailable(_) | Error::Io(_) => true,
            Error::Business { code, .. } => self.retry_codes.contains(code),
            _ => false,
        }
    }
}

/// Total time budget of one request across attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlinePolicy {
    /// Budget, zero disables the deadline
    pub timeout: Duration,
    /// Restart the window on every retry
    pub reset_on_retry: bool,
}

impl Default for DeadlinePolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            reset_on_retry: false,
        }
    }
}

impl DeadlinePolicy {
    /// Open a deadline window now
    #[must_use]
    pub fn start(&self) -> Deadline {
        Deadline {
            timeout: self.timeout,
            started: Instant::now(),
        }
    }
}

/// Running deadline window
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    timeout: Duration,
    started: Instant,
}

impl Deadline {
    /// Time spent in the current window
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the window ran out
    #[must_use]
    pub fn expired(&self) -> bool {
        !self.timeout.is_zero() && self.elapsed() >= self.timeout
    }

    /// Restart the window
    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    /// Error describing the expiry
    #[must_use]
    pub fn exceeded(&self) -> Error {
        Error::DeadlineExceeded {
            elapsed_ms: self.elapsed().as_millis() as u64,
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }
}

/// Exponential delay between attempts
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First delay
    pub initial: Duration,
    /// Delay cap
    pub max: Duration,
    /// Growth factor
    pub factor: f32,
}

impl BackoffPolicy {
    /// Build from config; `None` when backoff is disabled
    #[must_use]
    pub fn from_config(config: &BackoffConfig) -> Option<Self> {
        config.enabled.then_some(Self {
            initial: config.initial,
            max: config.max,
            factor: config.factor,
        })
    }

    /// Delays for up to `times` retries
    pub fn delays(&self, times: u32) -> impl Iterator<Item = Duration> + Send + use<> {
        ExponentialBuilder::default()
            .with_min_delay(self.initial)
            .with_max_delay(self.max)
            .with_factor(self.factor)
            .with_max_times(times as usize)
            .build()
    }
}

/// Effective failover settings for one request
#[derive(Debug, Clone)]
pub struct FailoverPolicy {
    /// Retries after the first attempt, 0 disables failover
    pub max_retry: u32,
    /// Fail instead of retrying once a single node remains
    pub only_once_per_node: bool,
    /// Retryable error classification
    pub exception: ExceptionPolicy,
    /// Request deadline
    pub deadline: DeadlinePolicy,
    /// Delay between attempts, none by default
    pub backoff: Option<BackoffPolicy>,
}

impl Default for FailoverPolicy {
    fn default() -> Self {
        Self::from(&FailoverConfig::default())
    }
}

impl From<&FailoverConfig> for FailoverPolicy {
    fn from(config: &FailoverConfig) -> Self {
        Self {
            max_retry: config.max_retry,
            only_once_per_node: config.only_once_per_node,
            exception: ExceptionPolicy::new(config.retry_codes.iter().cloned()),
            deadline: DeadlinePolicy {
                timeout: config.timeout,
                reset_on_retry: config.reset_timeout_on_retry,
            },
            backoff: BackoffPolicy::from_config(&config.backoff),
        }
    }
}

#[derive(Debug, Clone)]
struct MethodOverride {
    method: Pattern,
    max_retry: Option<u32>,
    only_once_per_node: Option<bool>,
}

/// Interface-wide policy plus per-method overrides
#[derive(Debug, Clone, Default)]
pub struct FailoverPolicies {
    default: FailoverPolicy,
    overrides: Vec<MethodOverride>,
}

impl FailoverPolicies {
    /// Single policy for every method
    #[must_use]
    pub fn uniform(policy: FailoverPolicy) -> Self {
        Self {
            default: policy,
            overrides: Vec::new(),
        }
    }

    /// Build from config
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid method glob.
    pub fn from_config(config: &FailoverConfig) -> Result<Self> {
        let overrides = config
            .methods
            .iter()
            .map(|m| {
                Ok(MethodOverride {
                    method: Pattern::new(&m.method).map_err(|e| {
                        Error::Config(format!("invalid failover method pattern '{}': {e}", m.method))
                    })?,
                    max_retry: m.max_retry,
                    only_once_per_node: m.only_once_per_node,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            default: FailoverPolicy::from(config),
            overrides,
        })
    }

    /// Policy in effect for `method`; the first matching override wins
    #[must_use]
    pub fn resolve(&self, method: &str) -> FailoverPolicy {
        let mut policy = self.default.clone();
        if let Some(o) = self.overrides.iter().find(|o| o.method.matches(method)) {
            if let Some(max_retry) = o.max_retry {
                policy.max_retry = max_retry;
            }
            if let Some(only_once) = o.only_once_per_node {
                policy.only_once_per_node = only_once;
            }
        }
        policy
    }
}

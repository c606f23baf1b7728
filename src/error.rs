//! Error types for the cluster invocation engine

use std::io;

use thiserror::Error;

/// Result type alias for cluster operations
pub type Result<T> = std::result::Result<T, Error>;

/// Cluster invocation errors
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Selection found nothing to pick from
    #[error("No node available: {0}")]
    NoNodeAvailable(String),

    /// Targeted lookup found no matching node
    #[error("No alive provider: {0}")]
    NoAliveProvider(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failover hit the maximum number of retries
    #[error("Retries exhausted after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// Number of attempts made (initial call included)
        attempts: u32,
        /// Error of the last attempt
        #[source]
        source: Box<Error>,
    },

    /// Only one node remained and it may not be retried
    #[error("No alive node after retry: {0}")]
    NoAliveAfterRetry(String),

    /// Request deadline fired during failover
    #[error("Deadline exceeded after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    DeadlineExceeded {
        /// Time spent on the request so far
        elapsed_ms: u64,
        /// Configured deadline
        timeout_ms: u64,
    },

    /// Transport-level failure reported by the invoker
    #[error("Transport error on {node}: {message}")]
    Transport {
        /// Node address
        node: String,
        /// Failure description
        message: String,
        /// Whether the transport marks the failure as safe to retry
        retryable: bool,
    },

    /// Business exception returned by the remote service
    #[error("Business error {code}: {message}")]
    Business {
        /// Application error code
        code: String,
        /// Error message
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Internal error (task failure, poisoned state)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a transport error
    pub fn transport(node: impl Into<String>, message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            node: node.into(),
            message: message.into(),
            retryable,
        }
    }

    /// Create a business error
    pub fn business(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Business {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Whether this is an exception raised by the remote service itself
    #[must_use]
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. })
    }

    /// Short stable label for logs, metrics and CLI summaries
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NoNodeAvailable(_) => "no_node",
            Self::NoAliveProvider(_) => "no_provider",
            Self::Config(_) => "config",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::NoAliveAfterRetry(_) => "no_alive_after_retry",
            Self::DeadlineExceeded { .. } => "deadline",
            Self::Transport { .. } => "transport",
            Self::Business { .. } => "business",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

//! RPC Cluster Library
//!
//! Client-side cluster invocation: given the alive nodes of a remote service,
//! pick which node(s) receive each request, retry on failure, and continuously
//! score node health so unhealthy nodes receive less traffic.
//!
//! # Features
//!
//! - **Load balance**: round-robin, weighted random, adaptive election
//! - **Selectors**: tag match, fixed random window, composable chains
//! - **Topologies**: single, broadcast, forking, pinpoint, condition-routed
//! - **Failover**: retry budget, elimination retry selector, deadline, backoff
//! - **Adaptive scoring**: judges vote, arbiters rank nodes and adjust weights

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adaptive;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod error;
pub mod invocation;
pub mod invoker;
pub mod loadbalance;
pub mod node;
pub mod route;
pub mod selector;
pub mod sim;
pub mod strategy;

pub use error::{Error, Result};
pub use invoker::ClusterInvoker;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// # Errors
///
/// Returns [`Error::Config`] if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Config(format!("tracing: {e}")))
}

//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Client-side cluster invocation engine: simulate and check cluster configs
#[derive(Parser, Debug)]
#[command(name = "rpc-cluster")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "RPC_CLUSTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "RPC_CLUSTER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "RPC_CLUSTER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Drive the simulated cluster from the config and print a JSON summary
    Simulate {
        /// Override `simulation.requests`
        #[arg(short, long)]
        requests: Option<usize>,

        /// Override `simulation.concurrency`
        #[arg(long)]
        concurrency: Option<usize>,

        /// Compact JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },

    /// Validate the config and print the resolved strategies
    Check {
        /// Also print the effective configuration as YAML
        #[arg(long)]
        print: bool,
    },

    /// List every registered strategy name
    Strategies,
}

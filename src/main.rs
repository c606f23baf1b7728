//! rpc-cluster - simulate and check cluster invocation configs

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::error;

use rpc_cluster::{
    cli::{Cli, Command},
    config::ClusterConfig,
    setup_tracing, sim,
    strategy::StrategyRegistry,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let result = match &cli.command {
        Command::Simulate {
            requests,
            concurrency,
            compact,
        } => run_simulate(&cli, *requests, *concurrency, *compact).await,
        Command::Check { print } => run_check(&cli, *print),
        Command::Strategies => run_strategies(),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ClusterConfig> {
    ClusterConfig::load(cli.config.as_deref()).context("Failed to load configuration")
}

/// Run the simulated cluster and print its summary
async fn run_simulate(
    cli: &Cli,
    requests: Option<usize>,
    concurrency: Option<usize>,
    compact: bool,
) -> anyhow::Result<()> {
    let mut config = load_config(cli)?;
    if let Some(requests) = requests {
        config.simulation.requests = requests;
    }
    if let Some(concurrency) = concurrency {
        config.simulation.concurrency = concurrency;
    }

    let summary = sim::run(&config, &StrategyRegistry::with_defaults())
        .await
        .context("Simulation failed")?;
    let json = if compact {
        serde_json::to_string(&summary)?
    } else {
        serde_json::to_string_pretty(&summary)?
    };
    println!("{json}");
    Ok(())
}

/// Validate the configuration
fn run_check(cli: &Cli, print: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    config.validate().context("Invalid configuration")?;

    println!("✅ {} - valid", config.name);
    println!("   Load balance: {}", config.load_balance);
    if !config.selectors.is_empty() {
        println!("   Selectors: {}", config.selectors.join(" -> "));
    }
    println!("   Route: {:?}", config.route.kind);
    println!(
        "   Failover: max_retry={} retry_selector={} timeout={:?}",
        config.failover.max_retry, config.failover.retry_selector, config.failover.timeout
    );
    println!(
        "   Adaptive: judges=[{}] arbiters=[{}]",
        config.adaptive.judges.join(", "),
        config.adaptive.arbiters.join(", ")
    );
    if print {
        println!("{}", config.to_yaml()?);
    }
    Ok(())
}

/// Print the built-in strategy names
fn run_strategies() -> anyhow::Result<()> {
    for (kind, names) in StrategyRegistry::with_defaults().names() {
        println!("{kind}: {}", names.join(", "));
    }
    Ok(())
}

//! strata - Tiered Memory-Access Coordinator CLI
//!
//! Drives the coordinator against simulated memory tiers: random workloads,
//! batch files, and inspection of learned access patterns.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter()?)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load()?;

    match cli.command {
        Commands::Simulate(args) => commands::simulate::execute(args, &config).await,
        Commands::Batch(args) => commands::batch::execute(args, &config).await,
        Commands::Patterns { json } => commands::patterns::execute(json, &config).await,
        Commands::Config { ttl } => commands::config::execute(ttl.as_deref(), &config),
        Commands::Version => {
            println!("strata {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// `RUST_LOG` plus defaults: CLI progress at info, library degradations at warn.
fn log_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("strata=info".parse()?)
        .add_directive("strata_core=warn".parse()?))
}

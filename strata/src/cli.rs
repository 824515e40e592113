//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tiered memory-access coordinator
///
/// Runs workloads against simulated short, mid and long-term memory tiers.
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a random workload and print diagnostics
    Simulate(SimulateArgs),

    /// Process a JSON file of requests as one batch
    Batch(BatchArgs),

    /// List persisted access patterns
    Patterns {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    Config {
        /// Show the cache TTL for a request type name
        #[arg(long, value_name = "REQUEST_TYPE")]
        ttl: Option<String>,
    },

    /// Show version information
    Version,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Number of requests (overrides config)
    #[arg(short, long)]
    pub requests: Option<usize>,

    /// Number of distinct chapters to draw from (overrides config)
    #[arg(short, long)]
    pub chapters: Option<u32>,

    /// Run the optimizer every N requests (0 disables)
    #[arg(long)]
    pub optimize_every: Option<usize>,

    /// Do not write learned patterns back to disk
    #[arg(long)]
    pub no_persist: bool,

    /// Print diagnostics as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// JSON file holding an array of requests
    pub file: PathBuf,

    /// Pretty-print the responses
    #[arg(long)]
    pub pretty: bool,

    /// Do not write learned patterns back to disk
    #[arg(long)]
    pub no_persist: bool,
}

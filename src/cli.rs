use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fleetcast - cluster state distribution for content clusters
#[derive(Parser, Debug)]
#[command(name = "fleetcast")]
#[command(author = "Fleetcast Team")]
#[command(version)]
#[command(about = "Distribute versioned cluster state bundles and track their convergence")]
#[command(long_about = "
fleetcast publishes cluster state bundles to distributor and storage nodes,
tracks acknowledgements, and runs two-phase activation for bundles that
require it.

Usage examples:
  fleetcast simulate --nodes 3                       # Converge a flat 3+3 cluster
  fleetcast simulate --deferred-activation           # Two-phase activation
  fleetcast simulate --partitioned-distributor 0 -v  # Show startup timestamp injection
  fleetcast parse-state 'distributor:2 storage:2 .0.s:d'
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an in-process simulated cluster until the bundle converges
    Simulate {
        /// Configuration file (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Number of distributors and storage nodes (flat cluster)
        #[arg(short, long)]
        nodes: Option<u16>,

        /// Maximum number of control loop ticks
        #[arg(short, long, default_value = "50")]
        ticks: u64,

        /// Bundle version to publish
        #[arg(long, default_value = "1")]
        state_version: u32,

        /// Baseline state; defaults to every configured node up
        #[arg(long)]
        state: Option<String>,

        /// Require two-phase activation
        #[arg(long)]
        deferred_activation: bool,

        /// Distributor that was cut off without restarting
        #[arg(long, value_name = "INDEX")]
        partitioned_distributor: Option<u16>,

        /// Print the final status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse a cluster state string and print it in canonical form
    ParseState {
        /// State in the textual format, e.g. "distributor:2 storage:2 .0.s:d"
        #[arg(value_name = "STATE")]
        state: String,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

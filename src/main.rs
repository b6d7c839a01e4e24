use fleetcast::cli::Cli;
use fleetcast::commands::{execute_command, init_tracing};
use clap::Parser;
use colored::*;
use std::process;

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let cli = Cli::parse();

    init_tracing(cli.debug);

    // Set up colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Handle any errors
    if let Err(e) = execute_command(cli.command, cli.verbose).await {
        eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
        process::exit(1);
    }
}

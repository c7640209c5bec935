// crates/fanout-cli/src/main.rs
//
// CLI entrypoint for the fanout developer tools.
//
// Provides subcommands for simulating a dispatch policy, comparing policies
// on a shared workload, and exploring consistent-hash ring behavior.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::compare::CompareCmd;
use commands::ring::RingCmd;
use commands::simulate::SimulateCmd;
use output::OutputFormat;

/// fanout CLI: dispatch policy experiments.
#[derive(Parser, Debug)]
#[command(
    name = "fanout",
    version = "0.1.0",
    about = "fanout CLI for task distribution experiments"
)]
struct Cli {
    /// Emit JSON instead of tables.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Simulate one dispatch policy on a virtual clock.
    Simulate(SimulateCmd),

    /// Run several policies over the same workload.
    Compare(CompareCmd),

    /// Consistent-hash ring experiments: assign, churn.
    #[command(subcommand)]
    Ring(RingCmd),
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Library logs go to stderr; quiet unless RUST_LOG asks for more.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);

    match &cli.command {
        Commands::Simulate(cmd) => commands::simulate::run(cmd, format)?,
        Commands::Compare(cmd) => commands::compare::run(cmd, format)?,
        Commands::Ring(cmd) => commands::ring::run(cmd, format)?,
    }

    Ok(())
}

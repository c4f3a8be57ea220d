mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "beamdrift", about = "Per-particle beam-induced motion estimation")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print or save the default configuration
    Config(commands::config::ConfigArgs),
    /// Estimate motion (or tune the motion prior) on a synthetic dataset
    Simulate(commands::simulate::SimulateArgs),
    /// Summarize the FCC tables written by a previous run
    Fcc(commands::fcc::FccArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Config(args) => commands::config::run(args),
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Fcc(args) => commands::fcc::run(args),
    }
}

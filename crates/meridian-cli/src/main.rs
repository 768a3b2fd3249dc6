//! Meridian CLI - runs and inspects latency-compensated metering graphs.

mod commands;
mod config;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meridian")]
#[command(author, version, about = "Meridian node graph CLI", long_about = None)]
struct Cli {
    /// Log prepare-time decisions at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare the demo graph, render it and report meter levels
    Run(commands::run::RunArgs),

    /// Print each node's properties and buffer strategy
    Inspect(commands::inspect::InspectArgs),

    /// Report cycle counter support and spin-pause cost
    Cpu(commands::cpu::CpuArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Cpu(args) => commands::cpu::run(args),
    }
}

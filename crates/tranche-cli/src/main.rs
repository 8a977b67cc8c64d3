//! Tranche CLI: milestone payment settlement on a distributed ledger.
//!
//! Subcommands: init, run, release.

mod commands;
mod config;
mod faucet;
mod records;
mod wallets;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use config::LoggingConfig;

/// Tranche: milestone payments, settled step by step.
#[derive(Parser, Debug)]
#[command(name = "tranche", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file.
    Init(commands::init::InitArgs),
    /// Run the default milestone simulation.
    Run(commands::run::RunArgs),
    /// Release the milestone escrow recorded by an earlier run.
    Release(commands::release::ReleaseArgs),
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Init(args) => {
            init_logging(&LoggingConfig::default());
            commands::init::run(args)
        }
        Commands::Run(args) => {
            let config = args.resolve_config()?;
            init_logging(&config.logging);
            tracing::info!("tranche v{}", env!("CARGO_PKG_VERSION"));
            commands::run::run(args, config).await
        }
        Commands::Release(args) => {
            let config = args.resolve_config()?;
            init_logging(&config.logging);
            commands::release::run(args, config).await
        }
    }
}

//! `tranche init` - Write a default configuration file.

use clap::Args;
use std::path::PathBuf;

use crate::config::TrancheConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path of the configuration file to create.
    #[arg(short, long, default_value = "tranche.toml")]
    pub config: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: &InitArgs) -> anyhow::Result<()> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "configuration file already exists at {}",
            args.config.display()
        );
    }

    TrancheConfig::default().save(&args.config)?;
    println!("Wrote default configuration to {}", args.config.display());
    println!("Run 'tranche run --config {}' to simulate the milestone flow.", args.config.display());
    Ok(())
}

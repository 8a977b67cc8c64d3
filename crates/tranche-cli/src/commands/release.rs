//! `tranche release` - Release the milestone escrow from an earlier run.
//!
//! Reads the escrow receipt from the saved run report and has the
//! contractor submit the release. Only succeeds once the escrow's release
//! time has passed; before that nothing is sent.

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tranche_core::TransactionBuilder;
use tranche_ledger::LedgerClient;
use tranche_settlement::scenario::{CONTRACTOR, MILESTONE_ESCROW};
use tranche_settlement::{CancellationFlag, SettlementOrchestrator, SettlementReport};

use crate::commands::run::{cancel_on_ctrl_c, connect, present};
use crate::config::{LedgerKind, TrancheConfig};
use crate::{records, wallets};

#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "tranche.toml")]
    pub config: PathBuf,

    /// Override the ledger backend.
    #[arg(long, value_enum)]
    pub ledger: Option<LedgerKind>,

    /// Override the wallets file written by `tranche run`.
    #[arg(long)]
    pub wallets: Option<PathBuf>,

    /// Override the report file written by `tranche run`.
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ReleaseArgs {
    pub fn resolve_config(&self) -> anyhow::Result<TrancheConfig> {
        let mut config = TrancheConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(kind) = self.ledger {
            config.ledger.kind = kind;
        }
        if let Some(ref path) = self.wallets {
            config.wallets.path = path.clone();
        }
        if let Some(ref path) = self.report {
            config.records.report_path = path.clone();
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

pub async fn run(args: &ReleaseArgs, config: TrancheConfig) -> anyhow::Result<()> {
    if config.ledger.kind == LedgerKind::Memory {
        anyhow::bail!(
            "the memory ledger does not outlive `tranche run`, so there is no escrow to release; use --ledger rpc"
        );
    }
    let ledger = connect(&config, None).await?;
    let report = execute(
        &config,
        ledger,
        TransactionBuilder::new(),
        &cancel_on_ctrl_c(),
    )
    .await?;
    present(&report, args.json, &config)
}

/// Release the escrow recorded in the saved report on `ledger`.
pub async fn execute(
    config: &TrancheConfig,
    ledger: Arc<dyn LedgerClient>,
    builder: TransactionBuilder,
    cancel: &CancellationFlag,
) -> anyhow::Result<SettlementReport> {
    let report_path = &config.records.report_path;
    let previous = records::load_report(report_path)
        .with_context(|| format!("reading {}", report_path.display()))?;
    if previous.ledger != ledger.ledger_id() {
        anyhow::bail!(
            "report {} was recorded on the {} ledger, not {}",
            report_path.display(),
            previous.ledger,
            ledger.ledger_id()
        );
    }
    let receipt = previous.escrow_receipt(MILESTONE_ESCROW).with_context(|| {
        format!(
            "run {} in {} committed no milestone escrow",
            previous.run_id,
            report_path.display()
        )
    })?;

    let wallets_path = &config.wallets.path;
    let participants = wallets::load(wallets_path)
        .with_context(|| format!("loading {}", wallets_path.display()))?;
    match participants.address(CONTRACTOR) {
        Some(contractor) if *contractor == receipt.destination => {}
        Some(contractor) => anyhow::bail!(
            "escrow {} pays {}, but the wallets' contractor is {contractor}",
            receipt.transaction_id,
            receipt.destination
        ),
        None => anyhow::bail!("wallets have no contractor account"),
    }

    tracing::info!(
        escrow = %receipt.transaction_id,
        owner = %receipt.owner,
        offer_sequence = receipt.offer_sequence,
        release_at = %receipt.release_at,
        "releasing milestone escrow"
    );

    let plan = config.scenario.release_plan(&receipt);
    let orchestrator =
        SettlementOrchestrator::with_builder(ledger, builder, config.settlement.clone());
    Ok(orchestrator.run(&plan, &participants, cancel).await?)
}

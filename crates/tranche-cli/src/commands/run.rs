//! `tranche run` - Run the milestone settlement scenario.

use anyhow::Context;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tranche_core::{Address, Amount};
use tranche_ledger::{JsonRpcLedger, LedgerClient, MemoryLedger};
use tranche_settlement::scenario::{OWNER, ROLES};
use tranche_settlement::{
    CancellationFlag, Outcome, Participants, SettlementOrchestrator, SettlementReport,
};

use crate::config::{LedgerKind, TrancheConfig};
use crate::faucet::Faucet;
use crate::{records, wallets};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "tranche.toml")]
    pub config: PathBuf,

    /// Override the ledger backend.
    #[arg(long, value_enum)]
    pub ledger: Option<LedgerKind>,

    /// Override where participant credentials are written.
    #[arg(long)]
    pub wallets: Option<PathBuf>,

    /// Load participants from the wallets file instead of creating new ones.
    #[arg(long)]
    pub reuse_wallets: bool,

    /// Print the full report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl RunArgs {
    /// Load the config file and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<TrancheConfig> {
        let mut config = TrancheConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        if let Some(kind) = self.ledger {
            config.ledger.kind = kind;
        }
        if let Some(ref path) = self.wallets {
            config.wallets.path = path.clone();
        }
        if let Some(ref level) = self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

pub async fn run(args: &RunArgs, config: TrancheConfig) -> anyhow::Result<()> {
    let report = execute(args.reuse_wallets, &config).await?;
    present(&report, args.json, &config)
}

/// Print a report and turn an unfinished plan into an error exit.
pub(crate) fn present(
    report: &SettlementReport,
    json: bool,
    config: &TrancheConfig,
) -> anyhow::Result<()> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        let explorer = (config.ledger.kind == LedgerKind::Rpc
            && !config.ledger.explorer_url.is_empty())
        .then_some(config.ledger.explorer_url.as_str());
        print_summary(report, explorer);
    }

    if report.requires_reconciliation() {
        anyhow::bail!(
            "plan {} stopped on a step with unknown outcome; reconcile against the ledger before retrying",
            report.plan
        );
    }
    if !report.is_completed() {
        anyhow::bail!("plan {} aborted: {:?}", report.plan, report.abort_cause);
    }
    Ok(())
}

/// Provision participants and the ledger, then run the plan.
pub async fn execute(reuse_wallets: bool, config: &TrancheConfig) -> anyhow::Result<SettlementReport> {
    let plan = config.scenario.plan()?;

    let participants = provision(reuse_wallets, config)?;
    let owner = participants
        .address(OWNER)
        .context("wallets have no owner account")?
        .clone();

    let ledger = connect(config, Some(&owner)).await?;

    tracing::info!(
        ledger = ledger.ledger_id(),
        plan = plan.name(),
        steps = plan.len(),
        "starting milestone simulation"
    );

    let orchestrator = SettlementOrchestrator::new(ledger, config.settlement.clone());
    let report = orchestrator
        .run(&plan, &participants, &cancel_on_ctrl_c())
        .await?;

    if config.records.persist {
        let path = &config.records.report_path;
        records::save_report(path, &report)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(report)
}

/// Open the configured ledger, funding `fund` with the scenario's owner
/// funding first when given.
pub(crate) async fn connect(
    config: &TrancheConfig,
    fund: Option<&Address>,
) -> anyhow::Result<Arc<dyn LedgerClient>> {
    match config.ledger.kind {
        LedgerKind::Memory => {
            let ledger = MemoryLedger::new().with_fee(config.ledger.fee());
            if let Some(owner) = fund {
                ledger.fund(owner, Amount::from_units(config.scenario.owner_funding_units));
            }
            Ok(Arc::new(ledger))
        }
        LedgerKind::Rpc => {
            let request_timeout = Duration::from_secs(config.ledger.request_timeout_secs);
            let ledger: Arc<dyn LedgerClient> = Arc::new(JsonRpcLedger::new(
                &config.ledger.rpc_url,
                config.ledger.fee(),
                config.settlement.poll_interval(),
                request_timeout,
            )?);
            if let Some(owner) = fund {
                let faucet = Faucet::new(&config.ledger.faucet_url, request_timeout)?;
                faucet
                    .fund(
                        ledger.as_ref(),
                        owner,
                        config.settlement.poll_interval(),
                        Duration::from_secs(config.ledger.funding_timeout_secs),
                    )
                    .await
                    .context("funding the owner account")?;
            }
            Ok(ledger)
        }
    }
}

/// Flag raised by Ctrl-C. The step in flight finishes; later ones never start.
pub(crate) fn cancel_on_ctrl_c() -> CancellationFlag {
    let cancel = CancellationFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.cancel();
        }
    });
    cancel
}

fn provision(reuse_wallets: bool, config: &TrancheConfig) -> anyhow::Result<Participants> {
    let path = &config.wallets.path;
    if reuse_wallets {
        return wallets::load(path).with_context(|| format!("loading {}", path.display()));
    }
    let participants = wallets::generate(&ROLES);
    if config.wallets.persist {
        wallets::save(path, &participants)
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(participants)
}

pub(crate) fn print_summary(report: &SettlementReport, explorer: Option<&str>) {
    println!("Plan:   {} ({})", report.plan, report.state);
    println!("Run:    {}", report.run_id);
    println!("Ledger: {}", report.ledger);
    println!();

    for result in &report.results {
        match &result.outcome {
            Outcome::Success {
                transaction_id,
                ledger_sequence,
                fee,
                ..
            } => println!(
                "  [{}] {:<24} {:<10} {} (ledger {}, fee {})",
                result.index, result.label, result.state, transaction_id, ledger_sequence, fee
            ),
            Outcome::Failure { reason } => println!(
                "  [{}] {:<24} {:<10} {}",
                result.index, result.label, result.state, reason
            ),
        }
    }
    for label in &report.skipped {
        println!("  [-] {label:<24} skipped");
    }

    if !report.final_balances.is_empty() {
        println!();
        println!("Final balances:");
        for (role, snapshot) in &report.final_balances {
            println!("  {role:<14} {} {}", snapshot.address, snapshot.balance);
        }
    }
    let fees = report.total_fees();
    if !fees.is_zero() {
        println!("Network fees: {fees}");
    }

    if let Some(explorer) = explorer {
        println!();
        for result in report.committed() {
            if let Some(tx) = result.transaction_id() {
                println!("  {}: {explorer}{tx}", result.label);
            }
        }
    }
}

//! Configuration file loading and management.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tranche_core::{Amount, EngineConfig};
use tranche_settlement::MilestoneScenario;

/// Full configuration for a `tranche run`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrancheConfig {
    /// Ledger backend settings.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub settlement: EngineConfig,

    /// Milestone scenario parameters.
    #[serde(default)]
    pub scenario: MilestoneScenario,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Credential persistence settings.
    #[serde(default)]
    pub wallets: WalletsConfig,

    /// Where run reports are kept for later commands.
    #[serde(default)]
    pub records: RecordsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    /// In-process ledger; no network access.
    Memory,
    /// JSON-RPC node plus faucet.
    Rpc,
}

/// Ledger backend settings.
///
/// The `rpc` backend submits tranche's own signed blob (hex of the signed
/// JSON transaction, ed25519 signature over its canonical bytes). Public
/// networks expect the binary transaction codec and reject it, so the
/// endpoints default to a local node and faucet that accept this format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_ledger_kind")]
    pub kind: LedgerKind,
    /// JSON-RPC endpoint of a node that accepts tranche blobs.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Faucet endpoint of the same network.
    #[serde(default = "default_faucet_url")]
    pub faucet_url: String,
    /// Prefix for transaction links in the run summary. Empty for none.
    #[serde(default)]
    pub explorer_url: String,
    /// Flat network fee per transaction, in drops.
    #[serde(default)]
    pub fee_drops: u64,
    /// HTTP timeout for a single RPC request (seconds).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long to wait for faucet funds to show up (seconds).
    #[serde(default = "default_funding_timeout_secs")]
    pub funding_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (text, json).
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletsConfig {
    /// Where generated credentials are written. The file holds secret seeds.
    #[serde(default = "default_wallets_path")]
    pub path: PathBuf,
    /// Write credentials at all.
    #[serde(default = "default_true")]
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// Report of the last `tranche run`; `tranche release` reads the escrow
    /// receipt from it. Holds addresses and transaction ids, no secrets.
    #[serde(default = "default_report_path")]
    pub report_path: PathBuf,
    /// Write the report at all.
    #[serde(default = "default_true")]
    pub persist: bool,
}

fn default_ledger_kind() -> LedgerKind {
    LedgerKind::Memory
}
fn default_rpc_url() -> String {
    "http://127.0.0.1:5005".into()
}
fn default_faucet_url() -> String {
    "http://127.0.0.1:5006/accounts".into()
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_funding_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_wallets_path() -> PathBuf {
    PathBuf::from("simulation_wallets.json")
}
fn default_report_path() -> PathBuf {
    PathBuf::from("last_run.json")
}
fn default_true() -> bool {
    true
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            kind: default_ledger_kind(),
            rpc_url: default_rpc_url(),
            faucet_url: default_faucet_url(),
            explorer_url: String::new(),
            fee_drops: 0,
            request_timeout_secs: default_request_timeout_secs(),
            funding_timeout_secs: default_funding_timeout_secs(),
        }
    }
}

impl LedgerConfig {
    pub fn fee(&self) -> Amount {
        Amount::from_drops(self.fee_drops)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            path: default_wallets_path(),
            persist: true,
        }
    }
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            report_path: default_report_path(),
            persist: true,
        }
    }
}

impl TrancheConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: TrancheConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save the current config to a TOML file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }
}

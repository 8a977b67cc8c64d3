//! Report of the last run, kept so a later command can pick up where it
//! left off. Holds addresses and transaction ids only.

use std::path::Path;
use tranche_settlement::SettlementReport;

pub fn save_report(path: &Path, report: &SettlementReport) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut json = report.to_json()?;
    json.push('\n');
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), run = %report.run_id, "report saved");
    Ok(())
}

pub fn load_report(path: &Path) -> anyhow::Result<SettlementReport> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

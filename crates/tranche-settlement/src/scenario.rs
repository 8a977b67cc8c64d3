//! The construction milestone flow: the owner locks a milestone in escrow
//! for the general contractor, pays a progress payment directly, and the
//! contractor pays a subcontractor out of it. Once the milestone's release
//! time has passed, a separate run lets the contractor release the escrow.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tranche_core::{Amount, Memo};

use crate::error::PlanError;
use crate::plan::{PlanStep, SettlementPlan};
use crate::types::EscrowReceipt;

pub const OWNER: &str = "owner";
pub const CONTRACTOR: &str = "contractor";
pub const SUBCONTRACTOR: &str = "subcontractor";

/// Label of the escrow step; its receipt is what a release run needs.
pub const MILESTONE_ESCROW: &str = "milestone-escrow";
pub const MILESTONE_RELEASE: &str = "milestone-release";

/// Roles of the milestone flow, in provisioning order.
pub const ROLES: [&str; 3] = [OWNER, CONTRACTOR, SUBCONTRACTOR];

/// Parameters of the milestone flow. Amounts are whole ledger units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneScenario {
    /// Prefix of every memo, e.g. "Project #2025-001".
    #[serde(default = "default_project")]
    pub project: String,
    /// Funding for the owner on the in-memory ledger.
    #[serde(default = "default_owner_funding")]
    pub owner_funding_units: u64,
    #[serde(default = "default_escrow_units")]
    pub escrow_units: u64,
    #[serde(default = "default_release_days")]
    pub release_days: i64,
    #[serde(default = "default_progress_units")]
    pub progress_payment_units: u64,
    #[serde(default = "default_subcontract_units")]
    pub subcontract_units: u64,
    #[serde(default = "default_escrow_memo")]
    pub escrow_memo: String,
    #[serde(default = "default_progress_memo")]
    pub progress_memo: String,
    #[serde(default = "default_subcontract_memo")]
    pub subcontract_memo: String,
    #[serde(default = "default_release_memo")]
    pub release_memo: String,
}

fn default_project() -> String {
    "Project #2025-001".into()
}
fn default_owner_funding() -> u64 {
    1_000
}
fn default_escrow_units() -> u64 {
    50
}
fn default_release_days() -> i64 {
    7
}
fn default_progress_units() -> u64 {
    25
}
fn default_subcontract_units() -> u64 {
    10
}
fn default_escrow_memo() -> String {
    "Foundation Complete - $100,000 USD".into()
}
fn default_progress_memo() -> String {
    "Progress Payment #1".into()
}
fn default_subcontract_memo() -> String {
    "Concrete Work - Division 03".into()
}
fn default_release_memo() -> String {
    "Milestone Released".into()
}

impl Default for MilestoneScenario {
    fn default() -> Self {
        Self {
            project: default_project(),
            owner_funding_units: default_owner_funding(),
            escrow_units: default_escrow_units(),
            release_days: default_release_days(),
            progress_payment_units: default_progress_units(),
            subcontract_units: default_subcontract_units(),
            escrow_memo: default_escrow_memo(),
            progress_memo: default_progress_memo(),
            subcontract_memo: default_subcontract_memo(),
            release_memo: default_release_memo(),
        }
    }
}

impl MilestoneScenario {
    fn memo_text(&self, text: &str) -> String {
        format!("{}: {}", self.project, text)
    }

    /// Build the settlement plan for this scenario.
    pub fn plan(&self) -> Result<SettlementPlan, PlanError> {
        let release_delay = Duration::try_days(self.release_days).ok_or_else(|| {
            PlanError::InvalidScenario(format!(
                "release_days {} is out of range",
                self.release_days
            ))
        })?;

        let mut plan = SettlementPlan::new(self.project.clone());
        plan.push(
            PlanStep::escrow(
                MILESTONE_ESCROW,
                OWNER,
                CONTRACTOR,
                Amount::from_units(self.escrow_units),
                release_delay,
            )
            .with_memo(Memo::escrow(self.memo_text(&self.escrow_memo))),
        );
        plan.push(
            PlanStep::payment(
                "progress-payment",
                OWNER,
                CONTRACTOR,
                Amount::from_units(self.progress_payment_units),
            )
            .with_memo(Memo::payment(self.memo_text(&self.progress_memo))),
        );
        plan.push(
            PlanStep::payment(
                "subcontractor-payment",
                CONTRACTOR,
                SUBCONTRACTOR,
                Amount::from_units(self.subcontract_units),
            )
            .with_memo(Memo::payment(self.memo_text(&self.subcontract_memo))),
        );
        Ok(plan)
    }

    /// Plan releasing the milestone escrow recorded by an earlier run. The
    /// contractor signs.
    pub fn release_plan(&self, receipt: &EscrowReceipt) -> SettlementPlan {
        SettlementPlan::new(format!("{} release", self.project)).with_step(
            PlanStep::escrow_release(MILESTONE_RELEASE, CONTRACTOR, receipt)
                .with_memo(Memo::escrow_release(self.memo_text(&self.release_memo))),
        )
    }
}

/// The default milestone plan.
pub fn milestone_plan() -> Result<SettlementPlan, PlanError> {
    MilestoneScenario::default().plan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::StepKind;
    use tranche_core::{Address, LedgerTime};

    #[test]
    fn test_default_plan_shape() {
        let plan = milestone_plan().unwrap();
        assert_eq!(plan.name(), "Project #2025-001");
        assert_eq!(plan.len(), 3);

        let steps = plan.steps();
        assert_eq!(
            steps[0].kind,
            StepKind::Escrow {
                from: OWNER.into(),
                to: CONTRACTOR.into(),
                amount: Amount::from_units(50),
                release_delay: Duration::days(7),
            }
        );
        assert_eq!(
            steps[0].memo.as_ref().unwrap().text_lossy(),
            "Project #2025-001: Foundation Complete - $100,000 USD"
        );
        assert_eq!(
            steps[1].memo.as_ref().unwrap().text_lossy(),
            "Project #2025-001: Progress Payment #1"
        );
        assert_eq!(steps[2].signer_role(), CONTRACTOR);
        assert_eq!(
            steps[2].memo.as_ref().unwrap().text_lossy(),
            "Project #2025-001: Concrete Work - Division 03"
        );
    }

    #[test]
    fn test_out_of_range_release_days_is_an_error() {
        for release_days in [200_000_000_000, i64::MAX, i64::MIN] {
            let scenario = MilestoneScenario {
                release_days,
                ..MilestoneScenario::default()
            };
            assert!(matches!(
                scenario.plan(),
                Err(PlanError::InvalidScenario(ref message)) if message.contains("release_days")
            ));
        }
    }

    #[test]
    fn test_release_plan_from_receipt() {
        let receipt = EscrowReceipt {
            label: MILESTONE_ESCROW.into(),
            transaction_id: "AB".into(),
            owner: Address::from_account_id(&[1u8; 20]),
            destination: Address::from_account_id(&[2u8; 20]),
            amount: Amount::from_units(50),
            offer_sequence: 4,
            release_at: LedgerTime(800_000_000),
        };
        let plan = MilestoneScenario::default().release_plan(&receipt);
        assert_eq!(plan.name(), "Project #2025-001 release");
        assert_eq!(plan.len(), 1);

        let step = &plan.steps()[0];
        assert_eq!(step.label, MILESTONE_RELEASE);
        assert_eq!(step.signer_role(), CONTRACTOR);
        assert!(matches!(
            step.kind,
            StepKind::EscrowRelease { offer_sequence: 4, .. }
        ));
        assert_eq!(
            step.memo.as_ref().unwrap().text_lossy(),
            "Project #2025-001: Milestone Released"
        );
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let scenario: MilestoneScenario =
            serde_json::from_str(r#"{ "project": "Project #7", "escrow_units": 80 }"#).unwrap();
        assert_eq!(scenario.escrow_units, 80);
        assert_eq!(scenario.progress_payment_units, 25);
        assert!(scenario.plan().unwrap().steps()[1]
            .memo
            .as_ref()
            .unwrap()
            .text_lossy()
            .starts_with("Project #7: "));
    }
}

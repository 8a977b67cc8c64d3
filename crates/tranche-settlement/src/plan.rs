use chrono::Duration;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tranche_core::{Address, Amount, LedgerTime, Memo};
use tranche_crypto::AccountHandle;

use crate::error::PlanError;
use crate::types::EscrowReceipt;

/// What a step does, in terms of participant roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepKind {
    Payment {
        from: String,
        to: String,
        amount: Amount,
    },
    Escrow {
        from: String,
        to: String,
        amount: Amount,
        release_delay: Duration,
    },
    /// Release of an escrow committed by an earlier run, identified by its
    /// owner and the sequence of the creating transaction.
    EscrowRelease {
        finisher: String,
        owner: Address,
        offer_sequence: u32,
        release_at: LedgerTime,
    },
}

/// Which earlier step must have committed before this one runs.
///
/// A step whose dependency did not commit is skipped. Steps that depend on
/// nothing still run after an earlier failure, so a plan of independent
/// payments settles every payment it can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dependency {
    /// The step immediately before this one.
    #[default]
    Previous,
    /// A specific earlier step by index.
    Step(usize),
    /// Independent of earlier steps.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    pub label: String,
    pub kind: StepKind,
    pub memo: Option<Memo>,
    pub depends_on: Dependency,
}

impl PlanStep {
    pub fn payment(
        label: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Amount,
    ) -> Self {
        Self::new(
            label,
            StepKind::Payment {
                from: from.into(),
                to: to.into(),
                amount,
            },
        )
    }

    pub fn escrow(
        label: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        amount: Amount,
        release_delay: Duration,
    ) -> Self {
        Self::new(
            label,
            StepKind::Escrow {
                from: from.into(),
                to: to.into(),
                amount,
                release_delay,
            },
        )
    }

    /// Release the escrow described by `receipt`. Independent of earlier
    /// steps: the escrow already exists on the ledger.
    pub fn escrow_release(
        label: impl Into<String>,
        finisher: impl Into<String>,
        receipt: &EscrowReceipt,
    ) -> Self {
        Self::new(
            label,
            StepKind::EscrowRelease {
                finisher: finisher.into(),
                owner: receipt.owner.clone(),
                offer_sequence: receipt.offer_sequence,
                release_at: receipt.release_at,
            },
        )
        .depends_on(Dependency::None)
    }

    fn new(label: impl Into<String>, kind: StepKind) -> Self {
        Self {
            label: label.into(),
            kind,
            memo: None,
            depends_on: Dependency::Previous,
        }
    }

    pub fn with_memo(mut self, memo: Memo) -> Self {
        self.memo = Some(memo);
        self
    }

    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.depends_on = dependency;
        self
    }

    /// Role whose account signs this step.
    pub fn signer_role(&self) -> &str {
        match &self.kind {
            StepKind::Payment { from, .. } | StepKind::Escrow { from, .. } => from,
            StepKind::EscrowRelease { finisher, .. } => finisher,
        }
    }

    /// Every role the step touches.
    pub fn roles(&self) -> Vec<&str> {
        match &self.kind {
            StepKind::Payment { from, to, .. } | StepKind::Escrow { from, to, .. } => {
                vec![from.as_str(), to.as_str()]
            }
            StepKind::EscrowRelease { finisher, .. } => vec![finisher.as_str()],
        }
    }

    /// Index of the step this one waits on, if any.
    pub fn dependency_index(&self, index: usize) -> Option<usize> {
        match self.depends_on {
            Dependency::Previous => index.checked_sub(1),
            Dependency::Step(step) => Some(step),
            Dependency::None => None,
        }
    }
}

/// A named, ordered list of steps. Executed one at a time, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    name: String,
    steps: Vec<PlanStep>,
}

impl SettlementPlan {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step and return its index.
    pub fn push(&mut self, step: PlanStep) -> usize {
        self.steps.push(step);
        self.steps.len() - 1
    }

    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.push(step);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Roles that sign at least one step.
    pub fn signer_roles(&self) -> BTreeSet<&str> {
        self.steps.iter().map(PlanStep::signer_role).collect()
    }

    /// Reject plans that could never run correctly, before any network call.
    pub fn validate(&self, participants: &Participants) -> Result<(), PlanError> {
        if self.steps.is_empty() {
            return Err(PlanError::EmptyPlan);
        }

        let mut labels = HashSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            if !labels.insert(step.label.as_str()) {
                return Err(PlanError::DuplicateLabel(step.label.clone()));
            }

            for role in step.roles() {
                if participants.get(role).is_none() {
                    return Err(PlanError::UnknownRole {
                        step: index,
                        label: step.label.clone(),
                        role: role.to_string(),
                    });
                }
            }

            if let Some(dependency) = step.dependency_index(index) {
                if dependency >= index {
                    return Err(PlanError::InvalidDependency {
                        step: index,
                        label: step.label.clone(),
                        depends_on: dependency,
                    });
                }
            }
        }
        Ok(())
    }
}

/// The accounts taking part in a plan, keyed by role.
#[derive(Clone, Default)]
pub struct Participants {
    accounts: BTreeMap<String, Arc<AccountHandle>>,
}

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account under its label.
    pub fn insert(&mut self, account: Arc<AccountHandle>) {
        self.accounts.insert(account.label().to_string(), account);
    }

    pub fn with(mut self, account: AccountHandle) -> Self {
        self.insert(Arc::new(account));
        self
    }

    pub fn get(&self, role: &str) -> Option<&Arc<AccountHandle>> {
        self.accounts.get(role)
    }

    pub fn address(&self, role: &str) -> Option<&Address> {
        self.accounts.get(role).map(|a| a.address())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<AccountHandle>)> {
        self.accounts.iter().map(|(role, account)| (role.as_str(), account))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl std::fmt::Debug for Participants {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(self.accounts.iter().map(|(role, a)| (role, a.address())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn participants() -> Participants {
        Participants::new()
            .with(AccountHandle::from_seed("owner", &[1u8; 32]))
            .with(AccountHandle::from_seed("contractor", &[2u8; 32]))
    }

    fn pay(label: &str) -> PlanStep {
        PlanStep::payment(label, "owner", "contractor", Amount::from_units(1))
    }

    fn receipt() -> EscrowReceipt {
        let owner = participants().address("owner").unwrap().clone();
        EscrowReceipt {
            label: "milestone-escrow".into(),
            transaction_id: "AB".into(),
            owner,
            destination: participants().address("contractor").unwrap().clone(),
            amount: Amount::from_units(50),
            offer_sequence: 1,
            release_at: LedgerTime(800_000_000),
        }
    }

    #[test]
    fn test_valid_plan() {
        let plan = SettlementPlan::new("p")
            .with_step(PlanStep::escrow(
                "escrow",
                "owner",
                "contractor",
                Amount::from_units(50),
                Duration::days(7),
            ))
            .with_step(pay("pay"))
            .with_step(PlanStep::escrow_release("release", "contractor", &receipt()));
        assert!(plan.validate(&participants()).is_ok());
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps()[1].dependency_index(1), Some(0));
        assert_eq!(plan.steps()[2].dependency_index(2), None);
        assert_eq!(
            plan.signer_roles().into_iter().collect::<Vec<_>>(),
            vec!["contractor", "owner"]
        );
    }

    #[test]
    fn test_empty_plan() {
        assert!(matches!(
            SettlementPlan::new("empty").validate(&participants()),
            Err(PlanError::EmptyPlan)
        ));
    }

    #[test]
    fn test_unknown_role() {
        let plan = SettlementPlan::new("p").with_step(PlanStep::payment(
            "pay",
            "owner",
            "subcontractor",
            Amount::from_units(1),
        ));
        assert!(matches!(
            plan.validate(&participants()),
            Err(PlanError::UnknownRole { ref role, .. }) if role == "subcontractor"
        ));
    }

    #[test]
    fn test_forward_and_self_dependencies() {
        let forward = SettlementPlan::new("p")
            .with_step(pay("a").depends_on(Dependency::Step(1)))
            .with_step(pay("b"));
        assert!(matches!(
            forward.validate(&participants()),
            Err(PlanError::InvalidDependency { step: 0, depends_on: 1, .. })
        ));

        let own = SettlementPlan::new("p")
            .with_step(pay("a"))
            .with_step(pay("b").depends_on(Dependency::Step(1)));
        assert!(matches!(
            own.validate(&participants()),
            Err(PlanError::InvalidDependency { step: 1, .. })
        ));
    }

    #[test]
    fn test_release_step_carries_receipt() {
        let step = PlanStep::escrow_release("release", "contractor", &receipt());
        assert_eq!(step.signer_role(), "contractor");
        assert_eq!(step.roles(), vec!["contractor"]);
        assert!(matches!(
            step.kind,
            StepKind::EscrowRelease { offer_sequence: 1, ref owner, .. }
                if owner == participants().address("owner").unwrap()
        ));
    }

    #[test]
    fn test_duplicate_label() {
        let plan = SettlementPlan::new("p").with_step(pay("a")).with_step(pay("a"));
        assert!(matches!(
            plan.validate(&participants()),
            Err(PlanError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn test_first_step_has_no_implicit_dependency() {
        assert_eq!(pay("a").dependency_index(0), None);
        assert_eq!(pay("a").dependency_index(3), Some(2));
        assert_eq!(pay("a").depends_on(Dependency::None).dependency_index(3), None);
    }

    #[test]
    fn test_participants_debug_hides_keys() {
        let debug = format!("{:?}", participants());
        assert!(debug.contains("owner"));
        assert!(!debug.contains("seed"));
    }
}

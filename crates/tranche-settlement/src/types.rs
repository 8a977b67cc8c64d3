use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tranche_core::{Address, Amount, EncodedMemo, LedgerTime, Operation, OperationKind, PlanState, StepState};
use uuid::Uuid;

/// Identifier of one execution of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Time-ordered (UUID v7).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What was submitted for a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSummary {
    pub kind: OperationKind,
    pub source: Address,
    pub destination: Option<Address>,
    pub amount: Option<Amount>,
    pub release_at: Option<LedgerTime>,
    pub memo: Option<EncodedMemo>,
}

impl From<&Operation> for OperationSummary {
    fn from(op: &Operation) -> Self {
        let release_at = match op {
            Operation::Escrow(escrow) => Some(escrow.release_at()),
            _ => None,
        };
        Self {
            kind: op.kind(),
            source: op.source().clone(),
            destination: op.destination().cloned(),
            amount: op.amount(),
            release_at,
            memo: op.memo().cloned(),
        }
    }
}

/// Why a step did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// The operation could not be built. Nothing was sent.
    Construction { message: String },
    /// Transport failure at submission. Nothing was accepted.
    Network { message: String },
    /// Pre-validation refused the transaction.
    Rejected { code: String, message: String },
    /// Validated, but not applied.
    NotCommitted { transaction_id: String, code: String },
    /// The transaction may or may not have committed.
    Indeterminate { transaction_id: String, detail: String },
    /// Any other ledger-side error at submission.
    Ledger { message: String },
}

impl FailureReason {
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Indeterminate { .. })
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Construction { message } => write!(f, "invalid operation: {message}"),
            Self::Network { message } => write!(f, "network error: {message}"),
            Self::Rejected { code, message } => write!(f, "rejected ({code}): {message}"),
            Self::NotCommitted {
                transaction_id,
                code,
            } => write!(f, "{transaction_id} validated with {code}"),
            Self::Indeterminate {
                transaction_id,
                detail,
            } => write!(f, "{transaction_id} outcome unknown: {detail}"),
            Self::Ledger { message } => write!(f, "ledger error: {message}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success {
        transaction_id: String,
        validated: bool,
        outcome_code: String,
        fee: Amount,
        ledger_sequence: u32,
        /// Account sequence the transaction consumed. For an escrow this is
        /// the offer sequence needed to release it.
        sequence: u32,
    },
    Failure {
        reason: FailureReason,
    },
}

/// Immutable record of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementResult {
    pub index: usize,
    pub label: String,
    /// Absent when the operation could not be built.
    pub operation: Option<OperationSummary>,
    pub state: StepState,
    pub outcome: Outcome,
    /// Source account balance observed after commitment.
    pub balance_after: Option<Amount>,
}

impl SettlementResult {
    pub fn transaction_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { transaction_id, .. } => Some(transaction_id),
            Outcome::Failure {
                reason:
                    FailureReason::NotCommitted { transaction_id, .. }
                    | FailureReason::Indeterminate { transaction_id, .. },
            } => Some(transaction_id),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn fee(&self) -> Amount {
        match self.outcome {
            Outcome::Success { fee, .. } => fee,
            Outcome::Failure { .. } => Amount::ZERO,
        }
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match &self.outcome {
            Outcome::Failure { reason } => Some(reason),
            Outcome::Success { .. } => None,
        }
    }
}

/// A committed escrow, with what a later run needs to release it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowReceipt {
    pub label: String,
    pub transaction_id: String,
    pub owner: Address,
    pub destination: Address,
    pub amount: Amount,
    pub offer_sequence: u32,
    pub release_at: LedgerTime,
}

/// Why a plan stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cause", rename_all = "snake_case")]
pub enum AbortCause {
    /// A step was rejected or not committed. Later steps that depend on it
    /// were skipped.
    Failed { step: usize },
    /// A step's outcome is unknown. Needs manual reconciliation.
    Indeterminate { step: usize },
    /// Cancelled before this step started.
    Cancelled { before_step: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub address: Address,
    pub balance: Amount,
}

/// Full step-by-step log of a plan run, returned even on abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub run_id: RunId,
    pub plan: String,
    pub ledger: String,
    pub state: PlanState,
    pub abort_cause: Option<AbortCause>,
    pub results: Vec<SettlementResult>,
    /// Labels of steps that never started, in plan order.
    pub skipped: Vec<String>,
    /// Balances of every participant, keyed by role. Only on completion.
    pub final_balances: BTreeMap<String, BalanceSnapshot>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SettlementReport {
    pub fn is_completed(&self) -> bool {
        self.state == PlanState::Completed
    }

    /// Whether an operator must check the ledger by hand.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self.abort_cause, Some(AbortCause::Indeterminate { .. }))
    }

    pub fn committed(&self) -> impl Iterator<Item = &SettlementResult> {
        self.results
            .iter()
            .filter(|r| r.state == StepState::Committed)
    }

    /// Fees paid across all steps.
    pub fn total_fees(&self) -> Amount {
        self.results
            .iter()
            .fold(Amount::ZERO, |acc, r| acc.checked_add(r.fee()).unwrap_or(acc))
    }

    pub fn result(&self, label: &str) -> Option<&SettlementResult> {
        self.results.iter().find(|r| r.label == label)
    }

    /// The escrow committed by the step `label`, if it committed one.
    pub fn escrow_receipt(&self, label: &str) -> Option<EscrowReceipt> {
        let result = self.result(label)?;
        let op = result.operation.as_ref()?;
        if result.state != StepState::Committed || op.kind != OperationKind::EscrowCreate {
            return None;
        }
        match &result.outcome {
            Outcome::Success {
                transaction_id,
                sequence,
                ..
            } => Some(EscrowReceipt {
                label: result.label.clone(),
                transaction_id: transaction_id.clone(),
                owner: op.source.clone(),
                destination: op.destination.clone()?,
                amount: op.amount?,
                offer_sequence: *sequence,
                release_at: op.release_at?,
            }),
            Outcome::Failure { .. } => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

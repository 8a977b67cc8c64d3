use chrono::Utc;
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::Instrument;
use tranche_core::{
    Address, EngineConfig, Operation, PlanEvent, PlanState, PlanStateMachine, StepEvent,
    StepState, StepStateMachine, TransactionBuilder,
};
use tranche_crypto::AccountHandle;
use tranche_ledger::{LedgerClient, LedgerError, SubmissionHandle};

use crate::cancel::CancellationFlag;
use crate::error::PlanError;
use crate::plan::{Participants, PlanStep, SettlementPlan, StepKind};
use crate::types::{
    AbortCause, BalanceSnapshot, FailureReason, OperationSummary, Outcome, RunId,
    SettlementReport, SettlementResult,
};

/// Sequences the steps of a plan against a ledger, one at a time.
///
/// A step runs only if the step it depends on committed. An indeterminate
/// outcome or a cancellation stops the plan outright.
pub struct SettlementOrchestrator {
    ledger: Arc<dyn LedgerClient>,
    builder: TransactionBuilder,
    config: EngineConfig,
}

impl SettlementOrchestrator {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: EngineConfig) -> Self {
        Self::with_builder(ledger, TransactionBuilder::new(), config)
    }

    pub fn with_builder(
        ledger: Arc<dyn LedgerClient>,
        builder: TransactionBuilder,
        config: EngineConfig,
    ) -> Self {
        Self {
            ledger,
            builder,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    /// Run a plan to completion or abort.
    ///
    /// Only an invalid plan is an error. Every step outcome, including
    /// aborts, is in the returned report.
    pub async fn run(
        &self,
        plan: &SettlementPlan,
        participants: &Participants,
        cancel: &CancellationFlag,
    ) -> Result<SettlementReport, PlanError> {
        plan.validate(participants)?;
        let run_id = RunId::new();
        let span = tracing::info_span!(
            "plan",
            plan = %plan.name(),
            run = %run_id,
            ledger = %self.ledger.ledger_id()
        );
        self.execute(run_id, plan, participants, cancel)
            .instrument(span)
            .await
    }

    /// Run independent plans concurrently.
    ///
    /// Refused with `SharedSigner` if any signing account appears in more
    /// than one plan, since two in-flight transactions from one signer race
    /// on its sequence number.
    pub async fn run_concurrent(
        &self,
        runs: &[(SettlementPlan, Participants)],
        cancel: &CancellationFlag,
    ) -> Result<Vec<SettlementReport>, PlanError> {
        let mut signers: HashMap<Address, usize> = HashMap::new();
        for (index, (plan, participants)) in runs.iter().enumerate() {
            plan.validate(participants)?;
            for role in plan.signer_roles() {
                if let Some(address) = participants.address(role) {
                    match signers.get(address) {
                        Some(&owner) if owner != index => {
                            return Err(PlanError::SharedSigner(address.clone()));
                        }
                        _ => {
                            signers.insert(address.clone(), index);
                        }
                    }
                }
            }
        }

        tracing::info!(plans = runs.len(), "running plans concurrently");
        join_all(
            runs.iter()
                .map(|(plan, participants)| self.run(plan, participants, cancel)),
        )
        .await
        .into_iter()
        .collect()
    }

    async fn execute(
        &self,
        run_id: RunId,
        plan: &SettlementPlan,
        participants: &Participants,
        cancel: &CancellationFlag,
    ) -> Result<SettlementReport, PlanError> {
        let started_at = Utc::now();
        let mut state = PlanState::NotStarted;
        let mut results: Vec<SettlementResult> = Vec::with_capacity(plan.len());
        let mut committed = vec![false; plan.len()];
        let mut abort_cause: Option<AbortCause> = None;

        for (index, step) in plan.steps().iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::warn!(step = %step.label, "plan cancelled before step");
                abort_cause.get_or_insert(AbortCause::Cancelled { before_step: index });
                break;
            }
            if let Some(dependency) = step.dependency_index(index) {
                if !committed[dependency] {
                    tracing::warn!(
                        step = %step.label,
                        depends_on = dependency,
                        "dependency did not commit, skipping"
                    );
                    continue;
                }
            }
            if state == PlanState::NotStarted {
                state = PlanStateMachine::transition(state, PlanEvent::Started)?;
            }

            let result = self.execute_step(index, step, participants).await?;
            let step_state = result.state;
            results.push(result);
            match step_state {
                StepState::Committed => committed[index] = true,
                StepState::Unknown => {
                    // Supersedes an earlier hard failure: the operator must reconcile.
                    abort_cause = Some(AbortCause::Indeterminate { step: index });
                    break;
                }
                _ => {
                    abort_cause.get_or_insert(AbortCause::Failed { step: index });
                }
            }
        }

        let skipped: Vec<String> = plan
            .steps()
            .iter()
            .enumerate()
            .filter(|(index, _)| !results.iter().any(|r| r.index == *index))
            .map(|(_, s)| s.label.clone())
            .collect();

        let mut final_balances = BTreeMap::new();
        match abort_cause {
            None => {
                state = PlanStateMachine::transition(state, PlanEvent::AllStepsCommitted)?;
                final_balances = self.snapshot(participants).await;
                tracing::info!(steps = results.len(), "plan completed");
            }
            Some(cause) => {
                state = PlanStateMachine::transition(state, PlanEvent::Aborted)?;
                match cause {
                    AbortCause::Indeterminate { step } => tracing::error!(
                        step,
                        skipped = skipped.len(),
                        "plan aborted on indeterminate step; reconcile against the ledger"
                    ),
                    _ => tracing::warn!(?cause, skipped = skipped.len(), "plan aborted"),
                }
            }
        }

        Ok(SettlementReport {
            run_id,
            plan: plan.name().to_string(),
            ledger: self.ledger.ledger_id().to_string(),
            state,
            abort_cause,
            results,
            skipped,
            final_balances,
            started_at,
            finished_at: Utc::now(),
        })
    }

    fn build(
        &self,
        step: &PlanStep,
        signer: &AccountHandle,
        participants: &Participants,
    ) -> Result<Operation, String> {
        let destination = |role: &str| {
            participants
                .address(role)
                .map(|a| a.to_string())
                .ok_or_else(|| format!("unknown role {role:?}"))
        };
        let memo = step.memo.as_ref();

        let op = match &step.kind {
            StepKind::Payment { to, amount, .. } => self
                .builder
                .build_payment(signer.address(), &destination(to)?, *amount, memo)
                .map(Operation::from),
            StepKind::Escrow {
                to,
                amount,
                release_delay,
                ..
            } => self
                .builder
                .build_escrow(
                    signer.address(),
                    &destination(to)?,
                    *amount,
                    *release_delay,
                    memo,
                )
                .map(Operation::from),
            StepKind::EscrowRelease {
                owner,
                offer_sequence,
                release_at,
                ..
            } => self
                .builder
                .build_escrow_finish(signer.address(), owner, *offer_sequence, *release_at, memo)
                .map(Operation::from),
        };
        op.map_err(|e| e.to_string())
    }

    async fn execute_step(
        &self,
        index: usize,
        step: &PlanStep,
        participants: &Participants,
    ) -> Result<SettlementResult, PlanError> {
        let mut state = StepState::Pending;
        let mut result = SettlementResult {
            index,
            label: step.label.clone(),
            operation: None,
            state,
            outcome: Outcome::Failure {
                reason: FailureReason::Construction {
                    message: String::new(),
                },
            },
            balance_after: None,
        };

        let built = match participants.get(step.signer_role()) {
            Some(signer) => self
                .build(step, signer, participants)
                .map(|op| (signer, op)),
            None => Err(format!("unknown role {:?}", step.signer_role())),
        };
        let (signer, operation) = match built {
            Ok(built) => built,
            Err(message) => {
                tracing::warn!(step = %step.label, %message, "operation could not be built");
                result.state = StepStateMachine::transition(state, StepEvent::SubmissionFailed)?;
                result.outcome = Outcome::Failure {
                    reason: FailureReason::Construction { message },
                };
                return Ok(result);
            }
        };
        result.operation = Some(OperationSummary::from(&operation));

        let handle = match self.ledger.submit(&operation, signer).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!(step = %step.label, error = %err, "submission failed");
                result.state = StepStateMachine::transition(state, StepEvent::SubmissionFailed)?;
                result.outcome = Outcome::Failure {
                    reason: submission_failure(err),
                };
                return Ok(result);
            }
        };
        state = StepStateMachine::transition(state, StepEvent::SubmissionAccepted)?;
        tracing::info!(
            step = %step.label,
            kind = %operation.kind(),
            tx = %handle.transaction_id,
            sequence = handle.sequence,
            "submitted"
        );

        state = StepStateMachine::transition(state, StepEvent::AwaitStarted)?;
        let timeout = self.config.finality_timeout();
        match self.ledger.await_finality(&handle, timeout).await {
            Ok(final_result) if final_result.committed => {
                result.state = StepStateMachine::transition(state, StepEvent::Validated)?;
                tracing::info!(
                    step = %step.label,
                    tx = %final_result.transaction_id,
                    ledger = final_result.ledger_sequence,
                    fee = %final_result.fee,
                    "committed"
                );
                if self.config.snapshot_after_step {
                    result.balance_after = self.balance_of(signer.address()).await;
                }
                result.outcome = Outcome::Success {
                    transaction_id: final_result.transaction_id,
                    validated: true,
                    outcome_code: final_result.outcome_code,
                    fee: final_result.fee,
                    ledger_sequence: final_result.ledger_sequence,
                    sequence: handle.sequence,
                };
            }
            Ok(final_result) => {
                result.state = StepStateMachine::transition(state, StepEvent::ValidatedFailed)?;
                tracing::warn!(
                    step = %step.label,
                    tx = %final_result.transaction_id,
                    code = %final_result.outcome_code,
                    "validated but not committed"
                );
                result.outcome = Outcome::Failure {
                    reason: FailureReason::NotCommitted {
                        transaction_id: final_result.transaction_id,
                        code: final_result.outcome_code,
                    },
                };
            }
            Err(err) => {
                result.state = StepStateMachine::transition(state, StepEvent::Indeterminate)?;
                tracing::error!(
                    step = %step.label,
                    tx = %handle.transaction_id,
                    error = %err,
                    "finality unknown"
                );
                result.outcome = Outcome::Failure {
                    reason: indeterminate(&handle, err),
                };
            }
        }
        Ok(result)
    }

    async fn balance_of(&self, address: &Address) -> Option<tranche_core::Amount> {
        match self.ledger.get_balance(address).await {
            Ok(balance) => Some(balance),
            Err(err) => {
                tracing::warn!(address = %address, error = %err, "balance snapshot failed");
                None
            }
        }
    }

    async fn snapshot(&self, participants: &Participants) -> BTreeMap<String, BalanceSnapshot> {
        let mut balances = BTreeMap::new();
        for (role, account) in participants.iter() {
            if let Some(balance) = self.balance_of(account.address()).await {
                tracing::info!(role, address = %account.address(), balance = %balance, "final balance");
                balances.insert(
                    role.to_string(),
                    BalanceSnapshot {
                        address: account.address().clone(),
                        balance,
                    },
                );
            }
        }
        balances
    }
}

fn submission_failure(err: LedgerError) -> FailureReason {
    match err {
        LedgerError::Network(message) => FailureReason::Network { message },
        LedgerError::RejectedByNetwork { code, message } => {
            FailureReason::Rejected { code, message }
        }
        other => FailureReason::Ledger {
            message: other.to_string(),
        },
    }
}

/// Anything other than a validated answer while waiting leaves the outcome
/// open.
fn indeterminate(handle: &SubmissionHandle, err: LedgerError) -> FailureReason {
    FailureReason::Indeterminate {
        transaction_id: handle.transaction_id.clone(),
        detail: err.to_string(),
    }
}

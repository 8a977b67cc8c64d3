//! Integration test: aborts, indeterminate outcomes and cancellation.
//!
//! Every test injects a fault into the in-memory ledger and checks that the
//! plan stops at the failing step with nothing submitted after it.

use std::sync::Arc;

use tranche_core::{Amount, PlanState, StepState};
use tranche_integration_tests::{
    fund_owner, ledger_with_fee, milestone_participants, CancelAfterFinality,
};
use tranche_ledger::{Fault, LedgerClient, MemoryLedger};
use tranche_settlement::scenario::{CONTRACTOR, OWNER};
use tranche_settlement::{
    milestone_plan, AbortCause, CancellationFlag, Dependency, FailureReason, Participants,
    PlanError, PlanStep, SettlementOrchestrator, SettlementPlan,
};

fn setup(funding_units: u64) -> (Arc<MemoryLedger>, Participants, SettlementOrchestrator) {
    let participants = milestone_participants();
    let ledger = ledger_with_fee(Amount::ZERO);
    fund_owner(&ledger, &participants, funding_units);
    let orchestrator = SettlementOrchestrator::new(ledger.clone(), Default::default());
    (ledger, participants, orchestrator)
}

#[tokio::test]
async fn test_network_failure_stops_the_plan() {
    let (ledger, participants, orchestrator) = setup(1_000);
    ledger.inject_fault(2, Fault::SubmitNetworkError);

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.state, PlanState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::Failed { step: 1 }));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.results[0].state, StepState::Committed);
    assert_eq!(report.results[1].state, StepState::Rejected);
    assert!(matches!(report.results[1].failure(), Some(FailureReason::Network { .. })));
    assert_eq!(report.skipped, vec!["subcontractor-payment".to_string()]);
    assert_eq!(ledger.submission_count(), 2);

    // Only the escrow moved funds.
    let owner = participants.address(OWNER).unwrap();
    assert_eq!(ledger.get_balance(owner).await.unwrap(), Amount::from_units(950));
    let contractor = participants.address(CONTRACTOR).unwrap();
    assert_eq!(ledger.get_balance(contractor).await.unwrap(), Amount::ZERO);
}

#[tokio::test]
async fn test_insufficient_funds_rejected_at_submission() {
    let (ledger, participants, orchestrator) = setup(60);

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    // 60 covers the 50 escrow but not the 25 progress payment.
    assert_eq!(report.abort_cause, Some(AbortCause::Failed { step: 1 }));
    match report.results[1].failure() {
        Some(FailureReason::Rejected { code, .. }) => assert_eq!(code, "tecUNFUNDED_PAYMENT"),
        other => panic!("expected a rejection, got {other:?}"),
    }
    let owner = participants.address(OWNER).unwrap();
    assert_eq!(ledger.get_balance(owner).await.unwrap(), Amount::from_units(10));
}

#[tokio::test]
async fn test_lost_connection_requires_reconciliation() {
    let (ledger, participants, orchestrator) = setup(1_000);
    ledger.inject_fault(3, Fault::FinalityUnknown);

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.state, PlanState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::Indeterminate { step: 2 }));
    assert!(report.requires_reconciliation());
    assert_eq!(report.results[2].state, StepState::Unknown);
    assert!(report.results[2].failure().unwrap().is_indeterminate());
}

#[tokio::test]
async fn test_validated_failure_is_not_committed() {
    let (ledger, participants, orchestrator) = setup(1_000);
    ledger.inject_fault(1, Fault::NotCommitted("tecNO_PERMISSION".into()));

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.abort_cause, Some(AbortCause::Failed { step: 0 }));
    match report.results[0].failure() {
        Some(FailureReason::NotCommitted { code, .. }) => assert_eq!(code, "tecNO_PERMISSION"),
        other => panic!("expected NotCommitted, got {other:?}"),
    }
    assert_eq!(report.skipped.len(), 2);
    assert!(report.committed().next().is_none());
}

#[tokio::test]
async fn test_cancelled_before_start_submits_nothing() {
    let (ledger, participants, orchestrator) = setup(1_000);
    let cancel = CancellationFlag::new();
    cancel.cancel();

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &cancel)
        .await
        .unwrap();

    assert_eq!(report.state, PlanState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::Cancelled { before_step: 0 }));
    assert!(report.results.is_empty());
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(ledger.submission_count(), 0);
}

#[tokio::test]
async fn test_cancelled_after_first_commit_keeps_it_and_stops() {
    let (ledger, participants, _) = setup(1_000);
    let cancel = CancellationFlag::new();
    let orchestrator = SettlementOrchestrator::new(
        Arc::new(CancelAfterFinality::new(ledger.clone(), cancel.clone())),
        Default::default(),
    );

    let report = orchestrator
        .run(&milestone_plan().unwrap(), &participants, &cancel)
        .await
        .unwrap();

    assert_eq!(report.state, PlanState::Aborted);
    assert_eq!(report.abort_cause, Some(AbortCause::Cancelled { before_step: 1 }));
    assert_eq!(report.results.len(), 1);
    assert_eq!(report.results[0].label, "milestone-escrow");
    assert_eq!(report.results[0].state, StepState::Committed);
    assert_eq!(
        report.skipped,
        vec!["progress-payment".to_string(), "subcontractor-payment".to_string()]
    );
    assert_eq!(ledger.submission_count(), 1);

    // The committed escrow stands; nothing else moved.
    let owner = participants.address(OWNER).unwrap();
    assert_eq!(ledger.get_balance(owner).await.unwrap(), Amount::from_units(950));
    assert_eq!(ledger.escrowed_balance(owner), Amount::from_units(50));
    let contractor = participants.address(CONTRACTOR).unwrap();
    assert_eq!(ledger.get_balance(contractor).await.unwrap(), Amount::ZERO);
}

#[tokio::test]
async fn test_independent_payment_settles_after_failure() {
    let (ledger, participants, orchestrator) = setup(1_000);
    ledger.inject_fault(1, Fault::NotCommitted("tecNO_PERMISSION".into()));

    let plan = milestone_plan().unwrap().with_step(
        PlanStep::payment("retainage", OWNER, CONTRACTOR, Amount::from_units(5))
            .depends_on(Dependency::None),
    );
    let report = orchestrator
        .run(&plan, &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(report.abort_cause, Some(AbortCause::Failed { step: 0 }));
    assert_eq!(
        report.skipped,
        vec!["progress-payment".to_string(), "subcontractor-payment".to_string()]
    );
    assert_eq!(report.result("retainage").unwrap().state, StepState::Committed);
    let contractor = participants.address(CONTRACTOR).unwrap();
    assert_eq!(ledger.get_balance(contractor).await.unwrap(), Amount::from_units(5));
}

#[tokio::test]
async fn test_invalid_plans_are_refused_before_submission() {
    let (ledger, participants, orchestrator) = setup(1_000);

    let unknown_role = SettlementPlan::new("bad").with_step(PlanStep::payment(
        "pay",
        OWNER,
        "architect",
        Amount::from_units(1),
    ));
    let err = orchestrator
        .run(&unknown_role, &participants, &CancellationFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::UnknownRole { .. }));

    let err = orchestrator
        .run(&SettlementPlan::new("empty"), &participants, &CancellationFlag::new())
        .await
        .unwrap_err();
    assert!(matches!(err, PlanError::EmptyPlan));

    assert_eq!(ledger.submission_count(), 0);
}

//! Integration test: the milestone flow end to end on the in-memory ledger.
//!
//! Builds participants with tranche-crypto, runs the default plan from
//! tranche-settlement against tranche-ledger's MemoryLedger, and checks the
//! resulting balances, escrow and report.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use tranche_core::{Amount, EngineConfig, FixedClock, Memo, PlanState, StepState, TransactionBuilder};
use tranche_integration_tests::{fund_owner, ledger_with_fee, milestone_participants};
use tranche_ledger::{EscrowStatus, LedgerClient, MemoryLedger};
use tranche_settlement::scenario::{CONTRACTOR, OWNER, SUBCONTRACTOR};
use tranche_settlement::{
    milestone_plan, CancellationFlag, FailureReason, MilestoneScenario, Participants, PlanStep,
    SettlementOrchestrator, SettlementPlan, MILESTONE_ESCROW,
};

/// Helper: three fresh accounts with only the owner funded.
fn setup(fee: Amount) -> (Arc<MemoryLedger>, Participants) {
    let participants = milestone_participants();
    let ledger = ledger_with_fee(fee);
    fund_owner(&ledger, &participants, 1_000);
    (ledger, participants)
}

fn orchestrator(ledger: &Arc<MemoryLedger>) -> SettlementOrchestrator {
    SettlementOrchestrator::new(ledger.clone(), Default::default())
}

// =========================================================================
// Default milestone flow
// =========================================================================

#[tokio::test]
async fn test_default_milestone_flow() {
    let (ledger, participants) = setup(Amount::ZERO);
    let report = orchestrator(&ledger)
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .expect("plan is valid");

    assert_eq!(report.state, PlanState::Completed);
    assert_eq!(report.results.len(), 3);
    assert!(report.results.iter().all(|r| r.state == StepState::Committed));
    assert!(report.skipped.is_empty());

    let owner = participants.address(OWNER).unwrap();
    let contractor = participants.address(CONTRACTOR).unwrap();
    let subcontractor = participants.address(SUBCONTRACTOR).unwrap();

    assert_eq!(ledger.get_balance(owner).await.unwrap(), Amount::from_units(925));
    assert_eq!(ledger.get_balance(contractor).await.unwrap(), Amount::from_units(15));
    assert_eq!(ledger.get_balance(subcontractor).await.unwrap(), Amount::from_units(10));
    assert_eq!(ledger.escrowed_balance(owner), Amount::from_units(50));

    // The escrow is held by the owner under the escrow step's sequence.
    let escrow_step = report.result("milestone-escrow").unwrap();
    let summary = escrow_step.operation.as_ref().unwrap();
    assert!(summary.release_at.is_some());
    let held = ledger.escrow(owner, 1).expect("escrow exists");
    assert_eq!(held.status, EscrowStatus::Held);
    assert_eq!(&held.destination, contractor);
    assert_eq!(held.amount, Amount::from_units(50));

    // Final balances mirror the ledger.
    assert_eq!(report.final_balances[OWNER].balance, Amount::from_units(925));
    assert_eq!(report.final_balances[CONTRACTOR].balance, Amount::from_units(15));
    assert_eq!(report.final_balances[SUBCONTRACTOR].balance, Amount::from_units(10));
}

#[tokio::test]
async fn test_transaction_ids_are_distinct() {
    let (ledger, participants) = setup(Amount::ZERO);
    let report = orchestrator(&ledger)
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    let mut ids: Vec<&str> = report.committed().filter_map(|r| r.transaction_id()).collect();
    assert_eq!(ids.len(), 3);
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_fees_are_charged_per_transaction() {
    let fee = Amount::from_drops(12);
    let (ledger, participants) = setup(fee);
    let report = orchestrator(&ledger)
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.total_fees(), Amount::from_drops(36));

    // Owner signed two transactions, the contractor one.
    let owner = participants.address(OWNER).unwrap();
    let contractor = participants.address(CONTRACTOR).unwrap();
    assert_eq!(
        ledger.get_balance(owner).await.unwrap(),
        Amount::from_drops(925_000_000 - 24)
    );
    assert_eq!(
        ledger.get_balance(contractor).await.unwrap(),
        Amount::from_drops(15_000_000 - 12)
    );
}

#[tokio::test]
async fn test_report_serializes_to_json() {
    let (ledger, participants) = setup(Amount::ZERO);
    let report = orchestrator(&ledger)
        .run(&milestone_plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["state"], "Completed");
    assert_eq!(json["results"].as_array().unwrap().len(), 3);
    assert_eq!(json["results"][1]["label"], "progress-payment");
    assert_eq!(json["results"][1]["outcome"]["status"], "success");
}

// =========================================================================
// Custom plans
// =========================================================================

#[tokio::test]
async fn test_scenario_amounts_are_configurable() {
    let (ledger, participants) = setup(Amount::ZERO);
    let scenario = MilestoneScenario {
        escrow_units: 100,
        progress_payment_units: 40,
        subcontract_units: 30,
        ..Default::default()
    };
    let report = orchestrator(&ledger)
        .run(&scenario.plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.final_balances[OWNER].balance, Amount::from_units(860));
    assert_eq!(report.final_balances[CONTRACTOR].balance, Amount::from_units(10));
    assert_eq!(report.final_balances[SUBCONTRACTOR].balance, Amount::from_units(30));
}

// =========================================================================
// Escrow release as a later run
// =========================================================================

#[tokio::test]
async fn test_milestone_escrow_released_after_release_time() {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap(),
    ));
    let ledger = Arc::new(MemoryLedger::with_clock(clock.clone()));
    let participants = milestone_participants();
    fund_owner(&ledger, &participants, 1_000);
    let orchestrator = SettlementOrchestrator::with_builder(
        ledger.clone(),
        TransactionBuilder::with_clock(clock.clone()),
        EngineConfig::default(),
    );
    let scenario = MilestoneScenario::default();

    let report = orchestrator
        .run(&scenario.plan().unwrap(), &participants, &CancellationFlag::new())
        .await
        .unwrap();
    assert!(report.is_completed());
    let receipt = report.escrow_receipt(MILESTONE_ESCROW).expect("escrow committed");

    // A JSON round trip stands in for the report file between runs.
    let saved: tranche_settlement::SettlementReport =
        serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(saved.escrow_receipt(MILESTONE_ESCROW), Some(receipt.clone()));

    let release = scenario.release_plan(&receipt);
    let early = orchestrator
        .run(&release, &participants, &CancellationFlag::new())
        .await
        .unwrap();
    assert_eq!(early.state, PlanState::Aborted);
    assert!(matches!(
        early.results[0].failure(),
        Some(FailureReason::Construction { .. })
    ));
    assert_eq!(ledger.submission_count(), 3);

    clock.advance(Duration::days(7));
    let released = orchestrator
        .run(&release, &participants, &CancellationFlag::new())
        .await
        .unwrap();
    assert!(released.is_completed(), "{released:?}");
    let owner = participants.address(OWNER).unwrap();
    assert_eq!(
        ledger.escrow(owner, receipt.offer_sequence).unwrap().status,
        EscrowStatus::Released
    );
    assert_eq!(ledger.escrowed_balance(owner), Amount::ZERO);
    let contractor = participants.address(CONTRACTOR).unwrap();
    assert_eq!(ledger.get_balance(contractor).await.unwrap(), Amount::from_units(65));

    // The same receipt cannot release twice.
    let again = orchestrator
        .run(&release, &participants, &CancellationFlag::new())
        .await
        .unwrap();
    assert!(matches!(
        again.results[0].failure(),
        Some(FailureReason::NotCommitted { .. })
    ));
}

#[tokio::test]
async fn test_memo_bytes_reach_the_report() {
    let (ledger, participants) = setup(Amount::ZERO);
    let memo = Memo::payment("b\u{e9}ton arm\u{e9}, lot 3");
    let plan = SettlementPlan::new("memo").with_step(
        PlanStep::payment("pay", OWNER, CONTRACTOR, Amount::from_units(1)).with_memo(memo.clone()),
    );
    let report = orchestrator(&ledger)
        .run(&plan, &participants, &CancellationFlag::new())
        .await
        .unwrap();

    let summary = report.results[0].operation.as_ref().unwrap();
    let encoded = summary.memo.as_ref().unwrap();
    assert_eq!(Memo::decode(encoded).unwrap(), memo);
}

#[tokio::test]
async fn test_concurrent_projects_settle_independently() {
    let (ledger, first) = setup(Amount::ZERO);
    let second = milestone_participants();
    fund_owner(&ledger, &second, 1_000);

    let runs = vec![(milestone_plan().unwrap(), first), (milestone_plan().unwrap(), second)];
    let reports = orchestrator(&ledger)
        .run_concurrent(&runs, &CancellationFlag::new())
        .await
        .unwrap();

    assert_eq!(reports.len(), 2);
    for report in &reports {
        assert!(report.is_completed());
        assert_eq!(report.final_balances[OWNER].balance, Amount::from_units(925));
    }
    assert_ne!(reports[0].run_id, reports[1].run_id);
    assert_eq!(ledger.submission_count(), 6);
}

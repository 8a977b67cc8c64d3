//! Tranche settlement engine
//!
//! Settlement plans, the orchestrator that drives them against a
//! [`tranche_ledger::LedgerClient`], and the default milestone scenario.

pub mod cancel;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod scenario;
pub mod types;

pub use cancel::CancellationFlag;
pub use error::PlanError;
pub use orchestrator::SettlementOrchestrator;
pub use plan::{Dependency, Participants, PlanStep, SettlementPlan, StepKind};
pub use scenario::{milestone_plan, MilestoneScenario, MILESTONE_ESCROW, MILESTONE_RELEASE};
pub use types::{
    AbortCause, BalanceSnapshot, EscrowReceipt, FailureReason, OperationSummary, Outcome, RunId,
    SettlementReport, SettlementResult,
};

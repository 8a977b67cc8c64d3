use crate::state_machine::{PlanState, StepState};

/// Core domain errors.
///
/// The construction-time variants (`InvalidAmount`, `InvalidDestination`,
/// `InvalidDelay`, `EscrowLocked`) are local and never worth retrying: the
/// caller has to fix its inputs.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("invalid release delay: {0}")]
    InvalidDelay(String),

    #[error("escrow is still locked until ledger time {release_at}")]
    EscrowLocked { release_at: u32 },

    #[error("invalid memo: {0}")]
    InvalidMemo(String),

    #[error("timestamp outside the ledger time range: {0}")]
    InvalidTimestamp(String),

    #[error("amount overflow")]
    AmountOverflow,

    #[error("invalid step transition from {from} to {to}")]
    InvalidStepTransition { from: StepState, to: StepState },

    #[error("invalid plan transition from {from} to {to}")]
    InvalidPlanTransition { from: PlanState, to: PlanState },
}

//! Tranche core
//!
//! Domain types shared by every layer: ledger amounts and addresses, memos,
//! the operations the engine submits, the transaction builder, and the
//! step/plan state machines.

pub mod builder;
pub mod clock;
pub mod config;
pub mod error;
pub mod memo;
pub mod operation;
pub mod state_machine;
pub mod types;

pub use builder::TransactionBuilder;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use error::CoreError;
pub use memo::{EncodedMemo, Memo, MemoCategory};
pub use operation::{
    EscrowFinishOperation, EscrowOperation, Operation, OperationKind, PaymentOperation,
};
pub use state_machine::{
    PlanEvent, PlanState, PlanStateMachine, StepEvent, StepState, StepStateMachine,
};
pub use types::{Address, Amount, LedgerTime, DROPS_PER_UNIT, MAX_DROPS};

//! Tranche ledger boundary
//!
//! The [`LedgerClient`] trait the settlement engine talks to, plus two
//! implementations: an in-memory ledger for tests and offline runs, and a
//! JSON-RPC client for a real node.

pub mod adapters;
pub mod error;
pub mod escrow;
pub mod traits;
pub mod types;

pub use adapters::{Fault, JsonRpcLedger, MemoryLedger};
pub use error::LedgerError;
pub use escrow::{EscrowBook, EscrowRefusal, EscrowStatus, LedgerEscrow};
pub use traits::LedgerClient;
pub use types::{codes, FinalResult, SignedTransaction, SubmissionHandle};

use async_trait::async_trait;
use std::time::Duration;
use tranche_core::{Address, Amount, Operation};
use tranche_crypto::AccountHandle;

use crate::error::LedgerError;
use crate::types::{FinalResult, SubmissionHandle};

/// Boundary to a distributed ledger network.
///
/// Implementations: [`crate::adapters::memory::MemoryLedger`] for tests and
/// offline simulation, [`crate::adapters::rpc::JsonRpcLedger`] for a real
/// node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Sign and send an operation. Success means the network accepted it for
    /// consideration, not that it is final.
    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountHandle,
    ) -> Result<SubmissionHandle, LedgerError>;

    /// Wait until the network validates the submission or `timeout` elapses.
    ///
    /// `Timeout` and `FinalityUnknown` are indeterminate: the transaction may
    /// still have committed.
    async fn await_finality(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> Result<FinalResult, LedgerError>;

    /// Point-in-time available balance. Read-after-write is only guaranteed
    /// after `await_finality` returned for the write. Unknown accounts read
    /// as zero.
    async fn get_balance(&self, address: &Address) -> Result<Amount, LedgerError>;

    /// Identifier of this ledger backend (e.g. "memory", "jsonrpc").
    fn ledger_id(&self) -> &str;
}

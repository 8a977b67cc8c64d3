//! Shared fixtures for the end-to-end tests in `tests/`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tranche_core::{Address, Amount, Operation};
use tranche_crypto::AccountHandle;
use tranche_ledger::{FinalResult, LedgerClient, LedgerError, MemoryLedger, SubmissionHandle};
use tranche_settlement::scenario::{OWNER, ROLES};
use tranche_settlement::{CancellationFlag, Participants};

/// Fresh accounts for every role of the milestone flow.
pub fn milestone_participants() -> Participants {
    ROLES
        .iter()
        .fold(Participants::new(), |p, &role| p.with(AccountHandle::generate(role)))
}

/// Fund the owner of `participants` with whole units.
pub fn fund_owner(ledger: &MemoryLedger, participants: &Participants, units: u64) {
    if let Some(owner) = participants.address(OWNER) {
        ledger.fund(owner, Amount::from_units(units));
    }
}

/// In-memory ledger with the given flat fee.
pub fn ledger_with_fee(fee: Amount) -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new().with_fee(fee))
}

/// Ledger that raises `cancel` once any submission reaches finality, as an
/// operator pressing Ctrl-C mid-plan would.
pub struct CancelAfterFinality {
    inner: Arc<MemoryLedger>,
    cancel: CancellationFlag,
}

impl CancelAfterFinality {
    pub fn new(inner: Arc<MemoryLedger>, cancel: CancellationFlag) -> Self {
        Self { inner, cancel }
    }
}

#[async_trait]
impl LedgerClient for CancelAfterFinality {
    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountHandle,
    ) -> Result<SubmissionHandle, LedgerError> {
        self.inner.submit(operation, signer).await
    }

    async fn await_finality(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> Result<FinalResult, LedgerError> {
        let result = self.inner.await_finality(handle, timeout).await;
        self.cancel.cancel();
        result
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount, LedgerError> {
        self.inner.get_balance(address).await
    }

    fn ledger_id(&self) -> &str {
        self.inner.ledger_id()
    }
}

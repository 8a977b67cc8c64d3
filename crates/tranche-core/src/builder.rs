use chrono::Duration;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::CoreError;
use crate::memo::Memo;
use crate::operation::{EscrowFinishOperation, EscrowOperation, PaymentOperation};
use crate::types::{Address, Amount, LedgerTime, MAX_DROPS};

/// Builds immutable, fully-formed operations from semantic parameters.
///
/// Construction is pure apart from reading the clock for escrow timing; no
/// network access happens here.
#[derive(Clone)]
pub struct TransactionBuilder {
    clock: Arc<dyn Clock>,
}

impl TransactionBuilder {
    /// Builder backed by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Current time in the ledger's time domain.
    pub fn ledger_now(&self) -> Result<LedgerTime, CoreError> {
        LedgerTime::from_datetime(self.clock.now())
    }

    /// Build a direct payment.
    pub fn build_payment(
        &self,
        source: &Address,
        destination: &str,
        amount: Amount,
        memo: Option<&Memo>,
    ) -> Result<PaymentOperation, CoreError> {
        validate_amount(amount)?;
        let destination = validate_destination(source, destination)?;

        Ok(PaymentOperation {
            source: source.clone(),
            destination,
            amount,
            memo: memo.map(Memo::encode),
        })
    }

    /// Build a time-locked escrow released `release_delay` from now.
    ///
    /// The delay must be at least one second; zero and negative delays are
    /// refused before anything else is checked.
    pub fn build_escrow(
        &self,
        source: &Address,
        destination: &str,
        amount: Amount,
        release_delay: Duration,
        memo: Option<&Memo>,
    ) -> Result<EscrowOperation, CoreError> {
        if release_delay < Duration::seconds(1) {
            return Err(CoreError::InvalidDelay(format!(
                "release delay must be at least 1s, got {}s",
                release_delay.num_seconds()
            )));
        }
        validate_amount(amount)?;
        let destination = validate_destination(source, destination)?;

        let release = self
            .clock
            .now()
            .checked_add_signed(release_delay)
            .ok_or_else(|| CoreError::InvalidDelay("release time overflows".into()))?;
        let release_at = LedgerTime::from_datetime(release)
            .map_err(|e| CoreError::InvalidDelay(e.to_string()))?;

        tracing::debug!(
            source = %source,
            destination = %destination,
            amount = %amount,
            release_at = release_at.as_secs(),
            "escrow built"
        );

        Ok(EscrowOperation {
            source: source.clone(),
            destination,
            amount,
            release_at,
            memo: memo.map(Memo::encode),
        })
    }

    /// Build the release of an escrow previously created by `owner`.
    ///
    /// Refused while the escrow is still locked, so a release is never sent
    /// to the network early.
    pub fn build_escrow_finish(
        &self,
        finisher: &Address,
        owner: &Address,
        offer_sequence: u32,
        release_at: LedgerTime,
        memo: Option<&Memo>,
    ) -> Result<EscrowFinishOperation, CoreError> {
        let now = self.ledger_now()?;
        if now < release_at {
            return Err(CoreError::EscrowLocked {
                release_at: release_at.as_secs(),
            });
        }

        Ok(EscrowFinishOperation {
            source: finisher.clone(),
            owner: owner.clone(),
            offer_sequence,
            memo: memo.map(Memo::encode),
        })
    }
}

impl Default for TransactionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TransactionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionBuilder").finish_non_exhaustive()
    }
}

fn validate_amount(amount: Amount) -> Result<(), CoreError> {
    if amount.is_zero() {
        return Err(CoreError::InvalidAmount("amount must be positive".into()));
    }
    if !amount.is_representable() {
        return Err(CoreError::InvalidAmount(format!(
            "{} drops exceeds the maximum of {MAX_DROPS}",
            amount.drops()
        )));
    }
    Ok(())
}

fn validate_destination(source: &Address, destination: &str) -> Result<Address, CoreError> {
    let destination = Address::parse(destination)?;
    if &destination == source {
        return Err(CoreError::InvalidDestination(format!(
            "{destination}: destination equals source"
        )));
    }
    Ok(destination)
}

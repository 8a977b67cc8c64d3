use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tranche_core::{Address, Amount, Clock, LedgerTime, Operation, SystemClock};
use tranche_crypto::AccountHandle;

use crate::error::LedgerError;
use crate::escrow::{EscrowBook, LedgerEscrow};
use crate::traits::LedgerClient;
use crate::types::{codes, FinalResult, SignedTransaction, SubmissionHandle};

/// Failure to inject for a given submission, counted from 1 in submission
/// order across all signers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `submit` fails with a transport error.
    SubmitNetworkError,
    /// `submit` is refused by pre-validation with this code.
    SubmitRejected(String),
    /// `await_finality` waits out the whole bound and times out.
    FinalityTimeout,
    /// `await_finality` loses the connection.
    FinalityUnknown,
    /// The transaction validates but is not applied.
    NotCommitted(String),
}

#[derive(Debug, Clone)]
struct AccountState {
    balance: Amount,
    next_sequence: u32,
    in_flight: Option<String>,
}

impl AccountState {
    fn new(balance: Amount) -> Self {
        Self {
            balance,
            next_sequence: 1,
            in_flight: None,
        }
    }
}

#[derive(Debug, Clone)]
struct PendingTransaction {
    ordinal: u64,
    operation: Operation,
    sequence: u32,
}

/// In-process ledger with the same observable behavior as a real network:
/// pre-validation at submission, application at validation, escrows held
/// outside the available balance, flat fees and injectable faults.
pub struct MemoryLedger {
    accounts: DashMap<Address, AccountState>,
    pending: DashMap<String, PendingTransaction>,
    finalized: DashMap<String, FinalResult>,
    escrows: EscrowBook,
    faults: DashMap<u64, Fault>,
    submissions: AtomicU64,
    ledger_index: AtomicU32,
    fee: Amount,
    clock: Arc<dyn Clock>,
    close: tokio::sync::Mutex<()>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Ledger whose escrow release checks read `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            accounts: DashMap::new(),
            pending: DashMap::new(),
            finalized: DashMap::new(),
            escrows: EscrowBook::new(),
            faults: DashMap::new(),
            submissions: AtomicU64::new(0),
            ledger_index: AtomicU32::new(1),
            fee: Amount::ZERO,
            clock,
            close: tokio::sync::Mutex::new(()),
        }
    }

    /// Flat fee charged to the source of every validated transaction.
    pub fn with_fee(mut self, fee: Amount) -> Self {
        self.fee = fee;
        self
    }

    pub fn fee(&self) -> Amount {
        self.fee
    }

    /// Credit an account, creating it if needed. Plays the test-network faucet.
    pub fn fund(&self, address: &Address, amount: Amount) {
        let mut account = self
            .accounts
            .entry(address.clone())
            .or_insert_with(|| AccountState::new(Amount::ZERO));
        account.balance = account.balance.checked_add(amount).unwrap_or(account.balance);
        tracing::debug!(address = %address, amount = %amount, "account funded");
    }

    /// Inject a fault for the `ordinal`-th submission (1-based).
    pub fn inject_fault(&self, ordinal: u64, fault: Fault) {
        self.faults.insert(ordinal, fault);
    }

    /// Funds locked in escrows owned by `owner`.
    pub fn escrowed_balance(&self, owner: &Address) -> Amount {
        self.escrows.held_by(owner)
    }

    pub fn escrow(&self, owner: &Address, sequence: u32) -> Option<LedgerEscrow> {
        self.escrows.get(owner, sequence)
    }

    /// Number of submissions seen so far, faulted ones included.
    pub fn submission_count(&self) -> u64 {
        self.submissions.load(Ordering::SeqCst)
    }

    fn fault_for(&self, ordinal: u64) -> Option<Fault> {
        self.faults.get(&ordinal).map(|f| f.clone())
    }

    /// Amount that must be available at submission.
    fn required_balance(&self, operation: &Operation) -> Option<Amount> {
        operation
            .amount()
            .unwrap_or(Amount::ZERO)
            .checked_add(self.fee)
    }

    fn credit(&self, address: &Address, amount: Amount) {
        let mut account = self
            .accounts
            .entry(address.clone())
            .or_insert_with(|| AccountState::new(Amount::ZERO));
        account.balance = account.balance.checked_add(amount).unwrap_or(account.balance);
    }

    /// Debit `amount` plus the fee. Returns `None`, leaving the balance
    /// untouched, if the account cannot cover it.
    fn debit(&self, address: &Address, amount: Amount) -> Option<()> {
        let mut account = self.accounts.get_mut(address)?;
        let total = amount.checked_add(self.fee)?;
        account.balance = account.balance.checked_sub(total)?;
        Some(())
    }

    /// Charge only the fee, as the network does for a validated failure.
    fn charge_fee(&self, address: &Address) -> Amount {
        match self.accounts.get_mut(address) {
            Some(mut account) => {
                let charged = if account.balance < self.fee {
                    account.balance
                } else {
                    self.fee
                };
                account.balance = account.balance.checked_sub(charged).unwrap_or(Amount::ZERO);
                charged
            }
            None => Amount::ZERO,
        }
    }

    fn clear_in_flight(&self, address: &Address) {
        if let Some(mut account) = self.accounts.get_mut(address) {
            account.in_flight = None;
        }
    }

    /// Apply a validated transaction. Returns the engine code and the fee
    /// actually charged.
    fn apply(&self, source: &Address, pending: &PendingTransaction) -> (&'static str, Amount) {
        match &pending.operation {
            Operation::Payment(op) => {
                if self.debit(source, op.amount()).is_none() {
                    return (codes::UNFUNDED_PAYMENT, self.charge_fee(source));
                }
                self.credit(op.destination(), op.amount());
                (codes::SUCCESS, self.fee)
            }
            Operation::Escrow(op) => {
                if self.debit(source, op.amount()).is_none() {
                    return (codes::UNFUNDED_PAYMENT, self.charge_fee(source));
                }
                self.escrows.create(
                    source.clone(),
                    pending.sequence,
                    op.destination().clone(),
                    op.amount(),
                    op.release_at(),
                );
                (codes::SUCCESS, self.fee)
            }
            Operation::EscrowFinish(op) => {
                let now = match LedgerTime::from_datetime(self.clock.now()) {
                    Ok(now) => now,
                    Err(_) => return (codes::NO_PERMISSION, self.charge_fee(source)),
                };
                match self.escrows.release(op.owner(), op.offer_sequence(), now) {
                    Ok(escrow) => {
                        let fee = self.charge_fee(source);
                        self.credit(&escrow.destination, escrow.amount);
                        (codes::SUCCESS, fee)
                    }
                    Err(refusal) => (refusal.code(), self.charge_fee(source)),
                }
            }
        }
    }

    fn finalize(
        &self,
        handle: &SubmissionHandle,
        code: &str,
        fee: Amount,
    ) -> FinalResult {
        let ledger_sequence = self.ledger_index.fetch_add(1, Ordering::SeqCst) + 1;
        let result = FinalResult {
            committed: code == codes::SUCCESS,
            transaction_id: handle.transaction_id.clone(),
            outcome_code: code.to_string(),
            fee,
            ledger_sequence,
        };
        self.pending.remove(&handle.transaction_id);
        self.clear_in_flight(&handle.source);
        self.finalized
            .insert(handle.transaction_id.clone(), result.clone());
        result
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn submit(
        &self,
        operation: &Operation,
        signer: &AccountHandle,
    ) -> Result<SubmissionHandle, LedgerError> {
        let ordinal = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        match self.fault_for(ordinal) {
            Some(Fault::SubmitNetworkError) => {
                tracing::warn!(ordinal, "injected network error at submit");
                return Err(LedgerError::Network("connection refused".into()));
            }
            Some(Fault::SubmitRejected(code)) => {
                return Err(LedgerError::rejected(&code, "injected rejection"));
            }
            _ => {}
        }

        let source = operation.source();
        if signer.address() != source {
            return Err(LedgerError::rejected(
                codes::BAD_AUTH,
                format!("{} cannot sign for {source}", signer.address()),
            ));
        }

        let mut account = self.accounts.get_mut(source).ok_or_else(|| {
            LedgerError::rejected(codes::NO_ACCOUNT, format!("{source} is not funded"))
        })?;

        if account.in_flight.is_some() {
            return Err(LedgerError::rejected(
                codes::PRE_SEQ,
                format!("{source} already has a transaction in flight"),
            ));
        }

        let required = self.required_balance(operation).ok_or_else(|| {
            LedgerError::rejected(codes::UNFUNDED_PAYMENT, "amount plus fee overflows")
        })?;
        if account.balance < required {
            return Err(LedgerError::rejected(
                codes::UNFUNDED_PAYMENT,
                format!("available {} is less than {required}", account.balance),
            ));
        }

        let sequence = account.next_sequence;
        let signed = SignedTransaction::sign(operation, signer, sequence, self.fee);
        let received = SignedTransaction::from_blob(&signed.to_blob())?;
        let signed_by = received
            .verify()
            .map_err(|e| LedgerError::rejected(codes::BAD_SIGNATURE, e.to_string()))?;
        if &signed_by != source {
            return Err(LedgerError::rejected(
                codes::BAD_AUTH,
                "signing key does not belong to the source account",
            ));
        }

        let transaction_id = received.transaction_id();
        account.next_sequence += 1;
        account.in_flight = Some(transaction_id.clone());
        drop(account);

        self.pending.insert(
            transaction_id.clone(),
            PendingTransaction {
                ordinal,
                operation: operation.clone(),
                sequence,
            },
        );

        tracing::debug!(
            tx = %transaction_id,
            kind = %operation.kind(),
            source = %source,
            sequence,
            "submission accepted"
        );

        Ok(SubmissionHandle {
            transaction_id,
            source: source.clone(),
            sequence,
            submitted_at: Utc::now(),
        })
    }

    async fn await_finality(
        &self,
        handle: &SubmissionHandle,
        timeout: Duration,
    ) -> Result<FinalResult, LedgerError> {
        if let Some(result) = self.finalized.get(&handle.transaction_id) {
            return Ok(result.clone());
        }

        let pending = self
            .pending
            .get(&handle.transaction_id)
            .map(|p| p.clone())
            .ok_or_else(|| LedgerError::UnknownSubmission(handle.transaction_id.clone()))?;

        match self.fault_for(pending.ordinal) {
            Some(Fault::FinalityTimeout) => {
                tokio::time::sleep(timeout).await;
                return Err(LedgerError::Timeout(timeout));
            }
            Some(Fault::FinalityUnknown) => {
                return Err(LedgerError::FinalityUnknown {
                    transaction_id: handle.transaction_id.clone(),
                    reason: "connection reset while waiting for validation".into(),
                });
            }
            Some(Fault::NotCommitted(code)) => {
                let _close = self.close.lock().await;
                let fee = self.charge_fee(&handle.source);
                return Ok(self.finalize(handle, &code, fee));
            }
            _ => {}
        }

        let _close = self.close.lock().await;
        // A concurrent waiter may have closed it while we queued for the lock.
        if let Some(result) = self.finalized.get(&handle.transaction_id) {
            return Ok(result.clone());
        }
        let (code, fee) = self.apply(&handle.source, &pending);
        let result = self.finalize(handle, code, fee);

        tracing::debug!(
            tx = %result.transaction_id,
            code = %result.outcome_code,
            ledger = result.ledger_sequence,
            "transaction validated"
        );
        Ok(result)
    }

    async fn get_balance(&self, address: &Address) -> Result<Amount, LedgerError> {
        Ok(self
            .accounts
            .get(address)
            .map(|a| a.balance)
            .unwrap_or(Amount::ZERO))
    }

    fn ledger_id(&self) -> &str {
        "memory"
    }
}

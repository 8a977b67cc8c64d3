use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::memo::EncodedMemo;
use crate::types::{Address, Amount, LedgerTime};

/// A direct payment. Only `TransactionBuilder` constructs these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOperation {
    pub(crate) source: Address,
    pub(crate) destination: Address,
    pub(crate) amount: Amount,
    pub(crate) memo: Option<EncodedMemo>,
}

impl PaymentOperation {
    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn memo(&self) -> Option<&EncodedMemo> {
        self.memo.as_ref()
    }
}

/// A time-locked escrow: the amount leaves the source's available balance at
/// commitment and becomes claimable by the destination after `release_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscrowOperation {
    pub(crate) source: Address,
    pub(crate) destination: Address,
    pub(crate) amount: Amount,
    pub(crate) release_at: LedgerTime,
    pub(crate) memo: Option<EncodedMemo>,
}

impl EscrowOperation {
    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn release_at(&self) -> LedgerTime {
        self.release_at
    }

    pub fn memo(&self) -> Option<&EncodedMemo> {
        self.memo.as_ref()
    }
}

/// Release of an escrow created by `owner` in its transaction with sequence
/// `offer_sequence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscrowFinishOperation {
    pub(crate) source: Address,
    pub(crate) owner: Address,
    pub(crate) offer_sequence: u32,
    pub(crate) memo: Option<EncodedMemo>,
}

impl EscrowFinishOperation {
    pub fn source(&self) -> &Address {
        &self.source
    }

    pub fn owner(&self) -> &Address {
        &self.owner
    }

    pub fn offer_sequence(&self) -> u32 {
        self.offer_sequence
    }

    pub fn memo(&self) -> Option<&EncodedMemo> {
        self.memo.as_ref()
    }
}

/// Transaction type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Payment,
    EscrowCreate,
    EscrowFinish,
}

impl OperationKind {
    /// Name used in the `TransactionType` field.
    pub fn transaction_type(&self) -> &'static str {
        match self {
            Self::Payment => "Payment",
            Self::EscrowCreate => "EscrowCreate",
            Self::EscrowFinish => "EscrowFinish",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.transaction_type())
    }
}

/// Any operation the engine can submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Operation {
    Payment(PaymentOperation),
    Escrow(EscrowOperation),
    EscrowFinish(EscrowFinishOperation),
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Payment(_) => OperationKind::Payment,
            Self::Escrow(_) => OperationKind::EscrowCreate,
            Self::EscrowFinish(_) => OperationKind::EscrowFinish,
        }
    }

    /// The account whose signature the operation needs.
    pub fn source(&self) -> &Address {
        match self {
            Self::Payment(op) => &op.source,
            Self::Escrow(op) => &op.source,
            Self::EscrowFinish(op) => &op.source,
        }
    }

    /// Destination, where the operation names one.
    pub fn destination(&self) -> Option<&Address> {
        match self {
            Self::Payment(op) => Some(&op.destination),
            Self::Escrow(op) => Some(&op.destination),
            Self::EscrowFinish(_) => None,
        }
    }

    /// Amount moved out of the source's available balance, if any.
    pub fn amount(&self) -> Option<Amount> {
        match self {
            Self::Payment(op) => Some(op.amount),
            Self::Escrow(op) => Some(op.amount),
            Self::EscrowFinish(_) => None,
        }
    }

    pub fn memo(&self) -> Option<&EncodedMemo> {
        match self {
            Self::Payment(op) => op.memo.as_ref(),
            Self::Escrow(op) => op.memo.as_ref(),
            Self::EscrowFinish(op) => op.memo.as_ref(),
        }
    }

    /// Canonical transaction JSON, with the network-assigned `Sequence` and
    /// `Fee` filled in by the submitting client.
    pub fn to_tx_json(&self, sequence: u32, fee: Amount) -> Value {
        let mut tx = Map::new();
        tx.insert("TransactionType".into(), json!(self.kind().transaction_type()));
        tx.insert("Account".into(), json!(self.source().as_str()));
        tx.insert("Sequence".into(), json!(sequence));
        tx.insert("Fee".into(), json!(fee.drops().to_string()));

        match self {
            Self::Payment(op) => {
                tx.insert("Destination".into(), json!(op.destination.as_str()));
                tx.insert("Amount".into(), json!(op.amount.drops().to_string()));
            }
            Self::Escrow(op) => {
                tx.insert("Destination".into(), json!(op.destination.as_str()));
                tx.insert("Amount".into(), json!(op.amount.drops().to_string()));
                tx.insert("FinishAfter".into(), json!(op.release_at.as_secs()));
            }
            Self::EscrowFinish(op) => {
                tx.insert("Owner".into(), json!(op.owner.as_str()));
                tx.insert("OfferSequence".into(), json!(op.offer_sequence));
            }
        }

        if let Some(memo) = self.memo() {
            tx.insert("Memos".into(), json!([{ "Memo": memo }]));
        }

        Value::Object(tx)
    }

    /// Bytes covered by the signature. `serde_json` maps are key-sorted, so
    /// this is deterministic for a given operation, sequence and fee.
    pub fn signing_payload(&self, sequence: u32, fee: Amount) -> Vec<u8> {
        serde_json::to_vec(&self.to_tx_json(sequence, fee)).unwrap_or_default()
    }
}

impl From<PaymentOperation> for Operation {
    fn from(op: PaymentOperation) -> Self {
        Self::Payment(op)
    }
}

impl From<EscrowOperation> for Operation {
    fn from(op: EscrowOperation) -> Self {
        Self::Escrow(op)
    }
}

impl From<EscrowFinishOperation> for Operation {
    fn from(op: EscrowFinishOperation) -> Self {
        Self::EscrowFinish(op)
    }
}

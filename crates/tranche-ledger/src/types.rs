use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tranche_core::{Address, Amount, Operation};
use tranche_crypto::{derive_address, transaction_id, verify, AccountHandle, PublicKey, Signature};

use crate::error::LedgerError;

/// Engine result codes the adapters produce or interpret.
pub mod codes {
    pub const SUCCESS: &str = "tesSUCCESS";
    pub const QUEUED: &str = "terQUEUED";
    pub const NO_ACCOUNT: &str = "terNO_ACCOUNT";
    pub const PRE_SEQ: &str = "terPRE_SEQ";
    pub const UNFUNDED_PAYMENT: &str = "tecUNFUNDED_PAYMENT";
    pub const INSUFFICIENT_FEE: &str = "terINSUF_FEE_B";
    pub const NO_TARGET: &str = "tecNO_TARGET";
    pub const NO_PERMISSION: &str = "tecNO_PERMISSION";
    pub const BAD_AUTH: &str = "tefBAD_AUTH";
    pub const BAD_SIGNATURE: &str = "temBAD_SIGNATURE";
    pub const MALFORMED: &str = "temMALFORMED";

    /// Whether a code returned at submission means the transaction was
    /// accepted for consideration. `tec` codes are provisional at that point
    /// and only become final on validation.
    pub fn accepted_at_submission(code: &str) -> bool {
        code == SUCCESS || code == QUEUED || code.starts_with("tec")
    }
}

/// Receipt of a submission. Does not imply finality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionHandle {
    pub transaction_id: String,
    pub source: Address,
    /// Account sequence consumed by the transaction.
    pub sequence: u32,
    pub submitted_at: DateTime<Utc>,
}

/// Validated outcome of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalResult {
    /// True only when the transaction was applied successfully.
    pub committed: bool,
    pub transaction_id: String,
    /// Engine result code, e.g. `tesSUCCESS` or `tecNO_PERMISSION`.
    pub outcome_code: String,
    /// Network fee charged to the source.
    pub fee: Amount,
    /// Index of the ledger that validated the transaction.
    pub ledger_sequence: u32,
}

/// A transaction plus its signature, as carried in the submit blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub tx_json: Value,
    #[serde(rename = "SigningPubKey")]
    pub signing_pub_key: String,
    #[serde(rename = "TxnSignature")]
    pub txn_signature: String,
}

impl SignedTransaction {
    /// Sign an operation with the network-assigned sequence and fee.
    pub fn sign(operation: &Operation, signer: &AccountHandle, sequence: u32, fee: Amount) -> Self {
        let payload = operation.signing_payload(sequence, fee);
        let signature = signer.sign(&payload);
        Self {
            tx_json: operation.to_tx_json(sequence, fee),
            signing_pub_key: signer.public_key().to_hex(),
            txn_signature: signature.to_hex(),
        }
    }

    /// Hex blob sent to the network.
    pub fn to_blob(&self) -> String {
        hex::encode_upper(serde_json::to_vec(self).unwrap_or_default())
    }

    pub fn from_blob(blob: &str) -> Result<Self, LedgerError> {
        let bytes = hex::decode(blob)
            .map_err(|e| LedgerError::rejected(codes::MALFORMED, format!("blob is not hex: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| LedgerError::rejected(codes::MALFORMED, format!("blob is not a transaction: {e}")))
    }

    pub fn transaction_id(&self) -> String {
        transaction_id(&serde_json::to_vec(self).unwrap_or_default())
    }

    /// Check the signature and return the address of the signing key.
    pub fn verify(&self) -> Result<Address, LedgerError> {
        let public_key = PublicKey::from_hex(&self.signing_pub_key)?;
        let signature = Signature::from_hex(&self.txn_signature)?;
        let payload = serde_json::to_vec(&self.tx_json)
            .map_err(|e| LedgerError::rejected(codes::MALFORMED, e.to_string()))?;
        verify(&payload, &signature, &public_key)?;
        Ok(derive_address(&public_key))
    }

    /// The `Account` field of the transaction.
    pub fn account(&self) -> Option<&str> {
        self.tx_json.get("Account").and_then(Value::as_str)
    }
}

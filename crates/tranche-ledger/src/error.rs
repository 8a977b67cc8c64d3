use std::time::Duration;

use tranche_crypto::CryptoError;

/// Errors at the ledger network boundary.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Transport failure. Transient; the caller may retry with backoff.
    #[error("network error: {0}")]
    Network(String),

    /// The network's pre-validation refused the transaction. Terminal for
    /// this operation.
    #[error("rejected by network ({code}): {message}")]
    RejectedByNetwork { code: String, message: String },

    /// No finality within the bound. The transaction may still commit.
    #[error("no finality within {0:?}")]
    Timeout(Duration),

    /// The connection dropped while waiting. The transaction may or may not
    /// have committed.
    #[error("finality unknown for {transaction_id}: {reason}")]
    FinalityUnknown {
        transaction_id: String,
        reason: String,
    },

    #[error("unknown submission: {0}")]
    UnknownSubmission(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("signing error: {0}")]
    Signing(#[from] CryptoError),
}

impl LedgerError {
    pub(crate) fn rejected(code: &str, message: impl Into<String>) -> Self {
        Self::RejectedByNetwork {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Whether the outcome of the operation is unknown: it must not be
    /// treated as success or as failure.
    pub fn is_indeterminate(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::FinalityUnknown { .. })
    }

    /// Whether a caller may retry with a freshly built operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

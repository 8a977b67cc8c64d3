use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::CoreError;

/// Fixed category tag carried in the memo type slot.
///
/// Categories are identified by their on-ledger tag: `Custom` holding a
/// reserved tag is the same category as the named variant, and serializes
/// as the bare tag string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemoCategory {
    /// Direct progress payment.
    Payment,
    /// Time-locked milestone escrow.
    Escrow,
    /// Release of a previously created escrow.
    EscrowRelease,
    /// Any other tag.
    Custom(String),
}

impl MemoCategory {
    /// The tag written on the ledger.
    pub fn tag(&self) -> &str {
        match self {
            Self::Payment => "construction-payment",
            Self::Escrow => "construction-escrow",
            Self::EscrowRelease => "construction-escrow-release",
            Self::Custom(tag) => tag,
        }
    }

    /// Map a tag back to its category. Unknown tags become `Custom`.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "construction-payment" => Self::Payment,
            "construction-escrow" => Self::Escrow,
            "construction-escrow-release" => Self::EscrowRelease,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl PartialEq for MemoCategory {
    fn eq(&self, other: &Self) -> bool {
        self.tag() == other.tag()
    }
}

impl Eq for MemoCategory {}

impl Hash for MemoCategory {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
    }
}

impl From<String> for MemoCategory {
    fn from(tag: String) -> Self {
        Self::from_tag(&tag)
    }
}

impl From<MemoCategory> for String {
    fn from(category: MemoCategory) -> Self {
        match category {
            MemoCategory::Custom(tag) => tag,
            named => named.tag().to_string(),
        }
    }
}

impl fmt::Display for MemoCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A memo attached to an operation: free text plus a category tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub category: MemoCategory,
    /// Raw memo bytes; usually UTF-8 text but not required to be.
    pub text: Vec<u8>,
}

impl Memo {
    pub fn new(category: MemoCategory, text: impl Into<Vec<u8>>) -> Self {
        Self {
            category,
            text: text.into(),
        }
    }

    pub fn payment(text: impl Into<Vec<u8>>) -> Self {
        Self::new(MemoCategory::Payment, text)
    }

    pub fn escrow(text: impl Into<Vec<u8>>) -> Self {
        Self::new(MemoCategory::Escrow, text)
    }

    pub fn escrow_release(text: impl Into<Vec<u8>>) -> Self {
        Self::new(MemoCategory::EscrowRelease, text)
    }

    /// Encode into the operation's memo slot (upper-case hex, as the ledger
    /// stores blobs).
    pub fn encode(&self) -> EncodedMemo {
        EncodedMemo {
            memo_type: hex::encode_upper(self.category.tag().as_bytes()),
            memo_data: hex::encode_upper(&self.text),
        }
    }

    /// Decode from the memo slot. Byte content is preserved exactly.
    pub fn decode(encoded: &EncodedMemo) -> Result<Self, CoreError> {
        let tag = hex::decode(&encoded.memo_type)
            .map_err(|e| CoreError::InvalidMemo(format!("memo type: {e}")))?;
        let tag = String::from_utf8(tag)
            .map_err(|e| CoreError::InvalidMemo(format!("memo type is not UTF-8: {e}")))?;
        let text = hex::decode(&encoded.memo_data)
            .map_err(|e| CoreError::InvalidMemo(format!("memo data: {e}")))?;
        Ok(Self {
            category: MemoCategory::from_tag(&tag),
            text,
        })
    }

    /// Memo text as UTF-8, lossily.
    pub fn text_lossy(&self) -> String {
        String::from_utf8_lossy(&self.text).into_owned()
    }
}

/// Memo as it sits inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMemo {
    #[serde(rename = "MemoType")]
    pub memo_type: String,
    #[serde(rename = "MemoData")]
    pub memo_data: String,
}

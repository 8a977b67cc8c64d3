use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tranche_core::{Address, Amount, LedgerTime};

use crate::types::codes;

/// Status of an escrow held by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowStatus {
    /// Funds are locked.
    Held,
    /// Funds were delivered to the destination.
    Released,
}

impl std::fmt::Display for EscrowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Held => write!(f, "Held"),
            Self::Released => write!(f, "Released"),
        }
    }
}

/// A time-locked escrow entry, keyed by owner and creating sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEscrow {
    pub owner: Address,
    pub sequence: u32,
    pub destination: Address,
    pub amount: Amount,
    pub release_at: LedgerTime,
    pub status: EscrowStatus,
    pub created_at: DateTime<Utc>,
}

/// Why an escrow release was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowRefusal {
    NotFound,
    Locked,
    AlreadyReleased,
}

impl EscrowRefusal {
    /// Engine result code recorded for the refused release.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound | Self::AlreadyReleased => codes::NO_TARGET,
            Self::Locked => codes::NO_PERMISSION,
        }
    }
}

/// Escrow objects held by the in-memory ledger.
pub struct EscrowBook {
    escrows: DashMap<(Address, u32), LedgerEscrow>,
}

impl EscrowBook {
    pub fn new() -> Self {
        Self {
            escrows: DashMap::new(),
        }
    }

    pub fn create(
        &self,
        owner: Address,
        sequence: u32,
        destination: Address,
        amount: Amount,
        release_at: LedgerTime,
    ) -> LedgerEscrow {
        let escrow = LedgerEscrow {
            owner: owner.clone(),
            sequence,
            destination,
            amount,
            release_at,
            status: EscrowStatus::Held,
            created_at: Utc::now(),
        };
        self.escrows.insert((owner, sequence), escrow.clone());
        tracing::info!(
            owner = %escrow.owner,
            sequence,
            amount = %amount,
            release_at = release_at.as_secs(),
            "escrow created"
        );
        escrow
    }

    /// Release an escrow if `now` is at or past its release time.
    pub fn release(
        &self,
        owner: &Address,
        sequence: u32,
        now: LedgerTime,
    ) -> Result<LedgerEscrow, EscrowRefusal> {
        let mut entry = self
            .escrows
            .get_mut(&(owner.clone(), sequence))
            .ok_or(EscrowRefusal::NotFound)?;
        let escrow = entry.value_mut();

        if escrow.status != EscrowStatus::Held {
            return Err(EscrowRefusal::AlreadyReleased);
        }
        if now < escrow.release_at {
            return Err(EscrowRefusal::Locked);
        }

        escrow.status = EscrowStatus::Released;
        tracing::info!(owner = %owner, sequence, "escrow released");
        Ok(escrow.clone())
    }

    /// Total still held for an owner.
    pub fn held_by(&self, owner: &Address) -> Amount {
        self.escrows
            .iter()
            .filter(|e| &e.owner == owner && e.status == EscrowStatus::Held)
            .fold(Amount::ZERO, |acc, e| {
                acc.checked_add(e.amount).unwrap_or(acc)
            })
    }

    pub fn get(&self, owner: &Address, sequence: u32) -> Option<LedgerEscrow> {
        self.escrows
            .get(&(owner.clone(), sequence))
            .map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.escrows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.escrows.is_empty()
    }
}

impl Default for EscrowBook {
    fn default() -> Self {
        Self::new()
    }
}

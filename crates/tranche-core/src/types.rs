use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Number of drops in one whole ledger unit.
pub const DROPS_PER_UNIT: u64 = 1_000_000;

/// Largest native amount the network can represent (100 billion units).
pub const MAX_DROPS: u64 = 100_000_000_000 * DROPS_PER_UNIT;

/// Unix timestamp of the ledger epoch (2000-01-01T00:00:00Z).
pub const LEDGER_EPOCH_OFFSET: i64 = 946_684_800;

/// Value in drops, the smallest unit of the native ledger currency.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount {
    /// Value in drops.
    pub value: u64,
}

impl Amount {
    /// Zero drops.
    pub const ZERO: Amount = Amount { value: 0 };

    /// Create an amount from a raw drop count.
    pub const fn from_drops(value: u64) -> Self {
        Self { value }
    }

    /// Create an amount from whole units. Saturates instead of wrapping, so an
    /// absurd input still fails range validation later.
    pub const fn from_units(units: u64) -> Self {
        Self {
            value: units.saturating_mul(DROPS_PER_UNIT),
        }
    }

    /// Value in drops.
    pub fn drops(&self) -> u64 {
        self.value
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// Whether the amount is within the network's representable range.
    pub fn is_representable(&self) -> bool {
        self.value <= MAX_DROPS
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.value.checked_add(other.value).map(Amount::from_drops)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.value.checked_sub(other.value).map(Amount::from_drops)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.value / DROPS_PER_UNIT,
            self.value % DROPS_PER_UNIT
        )
    }
}

/// Classic ledger address.
///
/// Format: base58 (ripple alphabet) of `0x00 || account_id[20] || checksum[4]`,
/// where the checksum is the first four bytes of a double SHA-256 over the
/// version byte and account id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    const VERSION: u8 = 0x00;
    const DECODED_LEN: usize = 25;

    /// Parse and validate an address string.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let bytes = bs58::decode(s)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_vec()
            .map_err(|e| CoreError::InvalidDestination(format!("{s}: {e}")))?;

        if bytes.len() != Self::DECODED_LEN {
            return Err(CoreError::InvalidDestination(format!(
                "{s}: expected {} decoded bytes, got {}",
                Self::DECODED_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != Self::VERSION {
            return Err(CoreError::InvalidDestination(format!(
                "{s}: unexpected version byte {:#04x}",
                bytes[0]
            )));
        }
        let (payload, checksum) = bytes.split_at(21);
        if checksum != Self::checksum(payload) {
            return Err(CoreError::InvalidDestination(format!(
                "{s}: checksum mismatch"
            )));
        }

        Ok(Self(s.to_string()))
    }

    /// Encode a 20-byte account id as an address.
    pub fn from_account_id(account_id: &[u8; 20]) -> Self {
        let mut bytes = Vec::with_capacity(Self::DECODED_LEN);
        bytes.push(Self::VERSION);
        bytes.extend_from_slice(account_id);
        let checksum = Self::checksum(&bytes);
        bytes.extend_from_slice(&checksum);
        Self(
            bs58::encode(bytes)
                .with_alphabet(bs58::Alphabet::RIPPLE)
                .into_string(),
        )
    }

    /// The encoded address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn checksum(payload: &[u8]) -> [u8; 4] {
        let digest = Sha256::digest(Sha256::digest(payload));
        [digest[0], digest[1], digest[2], digest[3]]
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Seconds since the ledger epoch (2000-01-01T00:00:00Z).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct LedgerTime(pub u32);

impl LedgerTime {
    /// Convert a wall-clock instant into ledger time.
    pub fn from_datetime(at: DateTime<Utc>) -> Result<Self, CoreError> {
        let secs = at.timestamp() - LEDGER_EPOCH_OFFSET;
        u32::try_from(secs)
            .map(Self)
            .map_err(|_| CoreError::InvalidTimestamp(at.to_rfc3339()))
    }

    /// Convert back into a wall-clock instant.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(i64::from(self.0) + LEDGER_EPOCH_OFFSET, 0)
            .single()
            .unwrap_or_default()
    }

    pub fn as_secs(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for LedgerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.to_datetime().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_units_and_display() {
        let amount = Amount::from_units(50);
        assert_eq!(amount.drops(), 50_000_000);
        assert_eq!(amount.to_string(), "50.000000");
        assert_eq!(Amount::from_drops(1).to_string(), "0.000001");
    }

    #[test]
    fn test_amount_range() {
        assert!(Amount::from_drops(MAX_DROPS).is_representable());
        assert!(!Amount::from_drops(MAX_DROPS + 1).is_representable());
        assert!(!Amount::from_units(u64::MAX).is_representable());
        assert!(Amount::ZERO.is_zero());
    }

    #[test]
    fn test_amount_checked_arithmetic() {
        let a = Amount::from_units(10);
        let b = Amount::from_units(4);
        assert_eq!(a.checked_sub(b), Some(Amount::from_units(6)));
        assert_eq!(b.checked_sub(a), None);
        assert_eq!(
            Amount::from_drops(u64::MAX).checked_add(Amount::from_drops(1)),
            None
        );
    }

    #[test]
    fn test_address_roundtrip() {
        let address = Address::from_account_id(&[7u8; 20]);
        assert!(address.as_str().starts_with('r'));
        let parsed = Address::parse(address.as_str()).unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn test_well_known_address_parses() {
        // The ledger's "account zero".
        let zero = Address::from_account_id(&[0u8; 20]);
        assert_eq!(zero.as_str(), "rrrrrrrrrrrrrrrrrrrrrhoLvTp");
        assert!(Address::parse("rrrrrrrrrrrrrrrrrrrrrhoLvTp").is_ok());
    }

    #[test]
    fn test_address_bad_checksum() {
        let address = Address::from_account_id(&[9u8; 20]);
        let mut tampered: Vec<char> = address.as_str().chars().collect();
        let last = tampered.len() - 1;
        tampered[last] = if tampered[last] == 'r' { 'p' } else { 'r' };
        let tampered: String = tampered.into_iter().collect();
        assert!(matches!(
            Address::parse(&tampered),
            Err(CoreError::InvalidDestination(_))
        ));
    }

    #[test]
    fn test_address_garbage() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("not-an-address").is_err());
        // '0' is not in the ripple alphabet
        assert!(Address::parse("r0000000000000000000000000").is_err());
    }

    #[test]
    fn test_address_serde_validates() {
        let address = Address::from_account_id(&[3u8; 20]);
        let json = serde_json::to_string(&address).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
        assert!(serde_json::from_str::<Address>("\"bogus\"").is_err());
    }

    #[test]
    fn test_ledger_time_conversion() {
        let at = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 10).unwrap();
        let lt = LedgerTime::from_datetime(at).unwrap();
        assert_eq!(lt, LedgerTime(10));
        assert_eq!(lt.to_datetime(), at);
    }

    #[test]
    fn test_ledger_time_before_epoch() {
        let at = Utc.with_ymd_and_hms(1999, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(
            LedgerTime::from_datetime(at),
            Err(CoreError::InvalidTimestamp(_))
        ));
    }
}

use std::fmt;

use tranche_core::Address;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};
use crate::signing::{self, Signature};

/// Derive the ledger address of a public key: the first 20 bytes of its
/// BLAKE3 digest, encoded as a classic address.
pub fn derive_address(public_key: &PublicKey) -> Address {
    let digest = blake3::hash(public_key.as_bytes());
    let mut account_id = [0u8; 20];
    account_id.copy_from_slice(&digest.as_bytes()[..20]);
    Address::from_account_id(&account_id)
}

/// A keyed ledger account: address plus signing capability.
///
/// The secret never leaves this type except through [`AccountHandle::export_seed`],
/// which exists for credential persistence. `Debug` output is redacted.
pub struct AccountHandle {
    label: String,
    address: Address,
    keypair: KeyPair,
}

impl AccountHandle {
    /// Provision a fresh account with a random key.
    pub fn generate(label: impl Into<String>) -> Self {
        Self::from_keypair(label, KeyPair::generate())
    }

    /// Restore an account from its 32-byte seed.
    pub fn from_seed(label: impl Into<String>, seed: &[u8; 32]) -> Self {
        Self::from_keypair(label, KeyPair::from_seed(seed))
    }

    /// Restore an account from a hex-encoded seed.
    pub fn from_seed_hex(label: impl Into<String>, seed_hex: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex)
                .map_err(|e| CryptoError::InvalidInput(format!("invalid seed hex: {e}")))?,
        );
        Ok(Self::from_keypair(label, KeyPair::from_bytes(&bytes)?))
    }

    fn from_keypair(label: impl Into<String>, keypair: KeyPair) -> Self {
        let address = derive_address(&keypair.public_key());
        Self {
            label: label.into(),
            address,
            keypair,
        }
    }

    /// Role name this account plays (owner, contractor, ...).
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    pub fn sign(&self, payload: &[u8]) -> Signature {
        signing::sign(payload, &self.keypair)
    }

    /// Hex seed for writing to a credentials file. Sensitive.
    pub fn export_seed(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.keypair.secret_bytes().as_slice()))
    }
}

impl fmt::Debug for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountHandle")
            .field("label", &self.label)
            .field("address", &self.address)
            .field("keypair", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::verify;

    #[test]
    fn test_address_is_valid_and_stable() {
        let account = AccountHandle::from_seed("owner", &[5u8; 32]);
        let again = AccountHandle::from_seed("owner", &[5u8; 32]);
        assert_eq!(account.address(), again.address());
        assert!(Address::parse(account.address().as_str()).is_ok());
    }

    #[test]
    fn test_distinct_accounts_distinct_addresses() {
        let a = AccountHandle::generate("owner");
        let b = AccountHandle::generate("contractor");
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_seed_export_restores_same_account() {
        let account = AccountHandle::generate("subcontractor");
        let seed = account.export_seed();
        let restored = AccountHandle::from_seed_hex("subcontractor", &seed).unwrap();
        assert_eq!(restored.address(), account.address());
    }

    #[test]
    fn test_from_seed_hex_rejects_garbage() {
        assert!(AccountHandle::from_seed_hex("x", "nothex").is_err());
        assert!(AccountHandle::from_seed_hex("x", "abcd").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let account = AccountHandle::from_seed("owner", &[9u8; 32]);
        let debug = format!("{account:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(account.export_seed().as_str()));
    }

    #[test]
    fn test_sign_verifies_against_public_key() {
        let account = AccountHandle::generate("owner");
        let sig = account.sign(b"payload");
        assert!(verify(b"payload", &sig, &account.public_key()).is_ok());
    }
}

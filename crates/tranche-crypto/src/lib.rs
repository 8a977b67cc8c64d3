pub mod account;
pub mod error;
pub mod keys;
pub mod signing;

pub use account::{derive_address, AccountHandle};
pub use error::CryptoError;
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, transaction_id, verify, Signature};

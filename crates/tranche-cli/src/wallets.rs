//! Credential file for the participants of a run.
//!
//! The file holds secret seeds in the clear. It is created owner-only on
//! unix, seeds are wiped from memory when dropped, and nothing here ever
//! logs a seed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tranche_crypto::AccountHandle;
use tranche_settlement::Participants;
use zeroize::{Zeroize, ZeroizeOnDrop};

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct WalletEntry {
    address: String,
    seed: String,
}

/// Write `{role: {address, seed}}` for every participant.
pub fn save(path: &Path, participants: &Participants) -> anyhow::Result<()> {
    let entries: BTreeMap<&str, WalletEntry> = participants
        .iter()
        .map(|(role, account)| {
            (
                role,
                WalletEntry {
                    address: account.address().to_string(),
                    seed: account.export_seed().to_string(),
                },
            )
        })
        .collect();
    let mut json = zeroize::Zeroizing::new(serde_json::to_vec_pretty(&entries)?);
    json.push(b'\n');

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(&json)?;

    tracing::warn!(
        path = %path.display(),
        accounts = entries.len(),
        "wallet file contains secret seeds; keep it secure"
    );
    Ok(())
}

/// Restore participants from a file written by [`save`].
pub fn load(path: &Path) -> anyhow::Result<Participants> {
    let contents = zeroize::Zeroizing::new(std::fs::read_to_string(path)?);
    let entries: BTreeMap<String, WalletEntry> = serde_json::from_str(&contents)?;

    let mut participants = Participants::new();
    for (role, entry) in &entries {
        let account = AccountHandle::from_seed_hex(role.as_str(), &entry.seed)?;
        if account.address().as_str() != entry.address {
            anyhow::bail!("wallet {role}: seed does not match address {}", entry.address);
        }
        participants.insert(Arc::new(account));
    }
    tracing::info!(path = %path.display(), accounts = participants.len(), "wallets loaded");
    Ok(participants)
}

/// Fresh accounts for the given roles.
pub fn generate(roles: &[&str]) -> Participants {
    let mut participants = Participants::new();
    for &role in roles {
        let account = AccountHandle::generate(role);
        tracing::info!(role, address = %account.address(), "account created");
        participants.insert(Arc::new(account));
    }
    participants
}

//! Test-network faucet client.

use serde_json::json;
use std::time::Duration;
use tranche_core::{Address, Amount};
use tranche_ledger::LedgerClient;

pub struct Faucet {
    client: reqwest::Client,
    url: String,
}

impl Faucet {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Ask the faucet to fund `destination`. Does not wait for the funds.
    pub async fn request(&self, destination: &Address) -> anyhow::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({ "destination": destination.as_str() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("faucet request for {destination} failed: HTTP {status}");
        }
        tracing::info!(address = %destination, "faucet request accepted");
        Ok(())
    }

    /// Request funds, then poll the ledger until they arrive or `timeout`
    /// elapses.
    pub async fn fund(
        &self,
        ledger: &dyn LedgerClient,
        destination: &Address,
        poll_interval: Duration,
        timeout: Duration,
    ) -> anyhow::Result<Amount> {
        let before = ledger.get_balance(destination).await?;
        self.request(destination).await?;
        wait_for_balance_above(ledger, destination, before, poll_interval, timeout).await
    }
}

/// Poll until the balance of `address` exceeds `floor`.
pub async fn wait_for_balance_above(
    ledger: &dyn LedgerClient,
    address: &Address,
    floor: Amount,
    poll_interval: Duration,
    timeout: Duration,
) -> anyhow::Result<Amount> {
    let wait = async {
        loop {
            let balance = ledger.get_balance(address).await?;
            if balance > floor {
                return Ok::<_, anyhow::Error>(balance);
            }
            tokio::time::sleep(poll_interval).await;
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(balance) => {
            let balance = balance?;
            tracing::info!(address = %address, balance = %balance, "funds arrived");
            Ok(balance)
        }
        Err(_) => anyhow::bail!("no funds for {address} after {timeout:?}"),
    }
}

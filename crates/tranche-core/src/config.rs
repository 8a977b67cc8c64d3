use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settlement engine knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on waiting for a single transaction to validate (seconds).
    #[serde(default = "default_finality_timeout_secs")]
    pub finality_timeout_secs: u64,
    /// Interval between transaction status polls (milliseconds).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Take a balance snapshot of the payer after every committed step.
    #[serde(default = "default_true")]
    pub snapshot_after_step: bool,
}

fn default_finality_timeout_secs() -> u64 {
    30
}
fn default_poll_interval_ms() -> u64 {
    1_000
}
fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            finality_timeout_secs: default_finality_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            snapshot_after_step: true,
        }
    }
}

impl EngineConfig {
    pub fn finality_timeout(&self) -> Duration {
        Duration::from_secs(self.finality_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

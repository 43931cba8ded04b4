use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// Timing of the biometric half of an unlock attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct UnlockConfig {
    pub poll_interval_ms: u64,
    /// How long to keep looking for the user's face after the password passed.
    pub confirmation_window_ms: u64,
    /// A verification older than this does not count.
    pub freshness_window_ms: u64,
}

impl Default for UnlockConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            confirmation_window_ms: 3_000,
            freshness_window_ms: 2_000,
        }
    }
}

impl UnlockConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_window_ms)
    }
}

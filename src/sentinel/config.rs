use serde::{Deserialize, Serialize};
use tokio::time::Duration;

/// What to do with detected faces when the classifier has no trained model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum DetectionOnlyPolicy {
    /// Any detected face counts as the authorized user.
    #[default]
    FailOpen,
    /// Any detected face counts as a stranger.
    FailClosed,
}

/// Tunables for the presence policy and the capture loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SentinelConfig {
    /// Scores at or above this are not a match, even for the right identity.
    pub confidence_threshold: f64,

    /// Consecutive unauthorized ticks tolerated; the next one locks.
    pub intruder_strike_limit: u32,

    /// Time without a verified face after which input activity is suspicious.
    pub ghost_input_window_ms: u64,

    /// Time without a verified face after which the session locks outright.
    pub absence_lock_timeout_ms: u64,

    /// How recent input must be to count as ghost input.
    pub ghost_input_recency_ms: u64,

    /// Ticks ignored at start while camera exposure settles.
    pub warmup_tick_count: u32,

    pub tick_interval_ms: u64,

    /// Pause after a failed camera read.
    pub frame_retry_backoff_ms: u64,

    pub detection_only_policy: DetectionOnlyPolicy,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 125.0,
            intruder_strike_limit: 10,
            ghost_input_window_ms: 5_000,
            absence_lock_timeout_ms: 10_000,
            ghost_input_recency_ms: 1_000,
            warmup_tick_count: 30,
            tick_interval_ms: 100,
            frame_retry_backoff_ms: 1_000,
            detection_only_policy: DetectionOnlyPolicy::FailOpen,
        }
    }
}

impl SentinelConfig {
    pub fn ghost_input_window(&self) -> Duration {
        Duration::from_millis(self.ghost_input_window_ms)
    }

    pub fn absence_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.absence_lock_timeout_ms)
    }

    pub fn ghost_input_recency(&self) -> Duration {
        Duration::from_millis(self.ghost_input_recency_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn frame_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.frame_retry_backoff_ms)
    }
}

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LockReason {
    IntruderDetected,
    AbsenceTimeout,
    GhostInput,
}

impl LockReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockReason::IntruderDetected => "IntruderDetected",
            LockReason::AbsenceTimeout => "AbsenceTimeout",
            LockReason::GhostInput => "GhostInput",
        }
    }
}

impl fmt::Display for LockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emitted once per lock episode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LockEvent {
    pub reason: LockReason,
    /// Operator-facing text shown on the lock screen.
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// `None` when the triggering frame could not be written.
    pub snapshot: Option<PathBuf>,
}

/// A lock event as stored in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockEventRecord {
    pub id: i64,
    pub session_id: String,
    pub event: LockEvent,
}

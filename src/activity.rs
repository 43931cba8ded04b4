//! Pointer and keyboard activity feeding the ghost-input rule.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::sentinel::SentinelController;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = false;

use crate::{log_debug, log_info};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    PointerMove,
    PointerClick,
    KeyPress,
}

#[derive(Debug, Clone, Copy)]
pub struct ActivityEvent {
    pub at: Instant,
    pub kind: ActivityKind,
}

impl ActivityEvent {
    pub fn now(kind: ActivityKind) -> Self {
        Self {
            at: Instant::now(),
            kind,
        }
    }
}

/// OS input hooks. Implementations push one event per pointer or key action
/// until unsubscribed.
pub trait ActivityMonitor: Send {
    fn subscribe(&mut self, sink: mpsc::UnboundedSender<ActivityEvent>) -> Result<()>;

    fn unsubscribe(&mut self);
}

/// Forwards input timestamps into the controller until cancelled or the
/// monitor hangs up.
pub async fn activity_listener(
    controller: SentinelController,
    mut events: mpsc::UnboundedReceiver<ActivityEvent>,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    log_debug!("input activity: {:?}", event.kind);
                    controller.record_input(event.at).await;
                }
                None => {
                    log_info!("activity monitor closed its channel");
                    break;
                }
            },
            _ = cancel_token.cancelled() => break,
        }
    }
}

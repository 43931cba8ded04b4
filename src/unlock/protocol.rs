use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;
use tokio::time::{self, Instant};

use crate::sentinel::SentinelController;

use super::config::UnlockConfig;
use super::credentials::CredentialVerifier;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum UnlockOutcome {
    Unlocked,
    PasswordRejected,
    /// No fresh verification inside the confirmation window. Carries the
    /// controller's last diagnostic line.
    BiometricTimeout { last_status: String },
}

/// Password first, then a fresh face. The only way out of `Locked`.
#[derive(Clone)]
pub struct UnlockProtocol {
    controller: SentinelController,
    credentials: Arc<dyn CredentialVerifier>,
    config: UnlockConfig,
}

impl UnlockProtocol {
    pub fn new(
        controller: SentinelController,
        credentials: Arc<dyn CredentialVerifier>,
        config: UnlockConfig,
    ) -> Self {
        Self {
            controller,
            credentials,
            config,
        }
    }

    pub fn config(&self) -> &UnlockConfig {
        &self.config
    }

    /// Runs one attempt. A rejected password returns at once; otherwise the
    /// controller is polled until the user's face is confirmed or the window
    /// runs out. Safe to retry after any outcome.
    pub async fn attempt_unlock(&self, password: &str) -> UnlockOutcome {
        let user_id = self.controller.authorized_user_id();
        if !self.credentials.verify(user_id, password) {
            warn!("unlock rejected: bad password for user {user_id}");
            return UnlockOutcome::PasswordRejected;
        }

        let started = Instant::now();
        let window = self.config.confirmation_window();
        let freshness = self.config.freshness_window();

        loop {
            let now = Instant::now();
            if self.controller.verified_within(freshness, now).await {
                self.controller.unlock().await;
                info!(
                    "unlock confirmed for user {user_id} after {}ms",
                    now.duration_since(started).as_millis()
                );
                return UnlockOutcome::Unlocked;
            }

            if now.duration_since(started) >= window {
                let last_status = self.controller.debug_status().await;
                warn!("unlock timed out waiting for face: {last_status}");
                return UnlockOutcome::BiometricTimeout { last_status };
            }

            time::sleep(self.config.poll_interval()).await;
        }
    }
}

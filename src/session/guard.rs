use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::{error, info};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::activity::{activity_listener, ActivityMonitor};
use crate::db::{Database, Session};
use crate::sentinel::{
    capture_loop, event_channel, release_source, share_frame_source, BreachRecorder,
    SentinelController, SentinelEvent, SharedFrameSource, UserId,
};
use crate::settings::SettingsStore;
use crate::unlock::{CredentialVerifier, UnlockProtocol};
use crate::vision::{Classifier, FrameSource};

/// Collaborators for one monitoring session.
pub struct GuardInputs {
    pub frame_source: Box<dyn FrameSource>,
    pub classifier: Arc<dyn Classifier>,
    pub activity: Box<dyn ActivityMonitor>,
    pub credentials: Arc<dyn CredentialVerifier>,
}

/// Starts monitoring sessions against one database and settings file.
#[derive(Clone)]
pub struct GuardSession {
    db: Database,
    settings: Arc<SettingsStore>,
    breach_dir: PathBuf,
}

impl GuardSession {
    pub fn new(db: Database, settings: Arc<SettingsStore>, breach_dir: PathBuf) -> Self {
        Self {
            db,
            settings,
            breach_dir,
        }
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Checks the device, opens the session row and spawns the capture loop
    /// and activity listener.
    pub async fn start(&self, user_id: UserId, inputs: GuardInputs) -> Result<GuardHandle> {
        let GuardInputs {
            frame_source,
            classifier,
            mut activity,
            credentials,
        } = inputs;
        let settings = self.settings.current();

        let binding = settings.device.clone();
        tokio::task::spawn_blocking(move || binding.verify())
            .await
            .context("device check worker join failed")?
            .context("device binding check failed")?;

        let session_id = self.db.start_session(user_id).await?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        if let Err(err) = activity.subscribe(input_tx) {
            if let Err(mark_err) = self
                .db
                .mark_session_interrupted(&session_id, Utc::now())
                .await
            {
                error!("failed to close session {session_id} after subscribe error: {mark_err:?}");
            }
            return Err(err.context("failed to subscribe to input activity"));
        }

        let (events_tx, events_rx) = event_channel();
        let recorder =
            BreachRecorder::new(self.breach_dir.clone()).with_journal(self.db.clone(), &session_id);
        let controller =
            SentinelController::new(user_id, settings.sentinel, classifier, recorder, events_tx);
        let unlock = UnlockProtocol::new(controller.clone(), credentials, settings.unlock);

        let cancel_token = CancellationToken::new();
        let source = share_frame_source(frame_source);
        let capture = tokio::spawn(capture_loop(
            controller.clone(),
            Arc::clone(&source),
            cancel_token.clone(),
        ));
        let listener = tokio::spawn(activity_listener(
            controller.clone(),
            input_rx,
            cancel_token.clone(),
        ));

        info!("monitoring started: session {session_id}, user {user_id}");

        Ok(GuardHandle {
            session_id,
            db: self.db.clone(),
            controller,
            unlock,
            events: Some(events_rx),
            cancel_token,
            capture: Some(capture),
            listener: Some(listener),
            source,
            activity,
        })
    }
}

/// A running monitoring session. Dropping it without [`GuardHandle::stop`]
/// cancels both tasks but leaves the session row `Running`; the next startup
/// marks it interrupted.
pub struct GuardHandle {
    session_id: String,
    db: Database,
    controller: SentinelController,
    unlock: UnlockProtocol,
    events: Option<mpsc::Receiver<SentinelEvent>>,
    cancel_token: CancellationToken,
    capture: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
    source: SharedFrameSource,
    activity: Box<dyn ActivityMonitor>,
}

impl GuardHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn controller(&self) -> &SentinelController {
        &self.controller
    }

    pub fn unlock_protocol(&self) -> &UnlockProtocol {
        &self.unlock
    }

    /// Hands out the lock event stream. Only the first call gets it.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<SentinelEvent>> {
        self.events.take()
    }

    pub fn status_updates(&self) -> watch::Receiver<String> {
        self.controller.status_updates()
    }

    /// Stops both tasks, releases the camera and closes the session row.
    ///
    /// The input hooks are detached and the row closed even when a task fails
    /// to join; the join failure is returned afterwards.
    pub async fn stop(mut self) -> Result<Session> {
        self.cancel_token.cancel();

        let mut join_failure = None;
        if let Some(handle) = self.capture.take() {
            if let Err(err) = handle.await {
                error!("capture loop task failed to join: {err}");
                // The loop never got to release the camera.
                if let Err(release_err) = release_source(Arc::clone(&self.source)).await {
                    error!("failed to release camera: {release_err:?}");
                }
                join_failure =
                    Some(anyhow::Error::new(err).context("capture loop task failed to join"));
            }
        }
        if let Some(handle) = self.listener.take() {
            if let Err(err) = handle.await {
                error!("activity listener task failed to join: {err}");
                if join_failure.is_none() {
                    join_failure = Some(
                        anyhow::Error::new(err).context("activity listener task failed to join"),
                    );
                }
            }
        }
        self.activity.unsubscribe();

        let absence_event_count = self.controller.absence_event_count().await;
        self.db
            .end_session(&self.session_id, absence_event_count, Utc::now())
            .await?;

        if let Some(err) = join_failure {
            return Err(err);
        }

        let session = self.db.get_session(&self.session_id).await?;
        if session.is_open() {
            bail!("session {} still open after stop", self.session_id);
        }

        info!(
            "monitoring stopped: session {}, {} lock episode(s)",
            self.session_id, session.absence_event_count
        );
        Ok(session)
    }
}

impl Drop for GuardHandle {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

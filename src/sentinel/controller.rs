use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{Duration, Instant};

use crate::db::{LockEvent, LockReason};
use crate::vision::{Classifier, FaceObservation, Frame};

use super::breach::BreachRecorder;
use super::config::{DetectionOnlyPolicy, SentinelConfig};
use super::policy::{classify_observations, evaluate_tick, TickDecision};
use super::state::{ControllerState, GuardMode, UserId};

/// Room for lock transitions nobody has read yet. Each lock needs an unlock
/// before the next one, so a live reader never gets close.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Lock transitions, in order. Presence status goes out separately on a
/// `watch` channel, see [`SentinelController::status_updates`].
#[derive(Debug, Clone, PartialEq)]
pub enum SentinelEvent {
    Locked(LockEvent),
    Unlocked,
}

pub fn event_channel() -> (mpsc::Sender<SentinelEvent>, mpsc::Receiver<SentinelEvent>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}

/// Owns the lock state of one monitoring session.
///
/// Cloning hands out another handle to the same state, so the capture loop,
/// the activity listener and the unlock protocol can each hold one.
#[derive(Clone)]
pub struct SentinelController {
    state: Arc<Mutex<ControllerState>>,
    authorized_user_id: UserId,
    config: Arc<SentinelConfig>,
    classifier: Arc<dyn Classifier>,
    recorder: BreachRecorder,
    status: Arc<watch::Sender<String>>,
    events: mpsc::Sender<SentinelEvent>,
}

impl SentinelController {
    pub fn new(
        authorized_user_id: UserId,
        config: SentinelConfig,
        classifier: Arc<dyn Classifier>,
        recorder: BreachRecorder,
        events: mpsc::Sender<SentinelEvent>,
    ) -> Self {
        if !classifier.identifies() {
            match config.detection_only_policy {
                DetectionOnlyPolicy::FailOpen => warn!(
                    "no trained model loaded; running detection-only, any face counts as user {authorized_user_id}"
                ),
                DetectionOnlyPolicy::FailClosed => warn!(
                    "no trained model loaded; running detection-only, any face counts as a stranger"
                ),
            }
        }

        Self {
            state: Arc::new(Mutex::new(ControllerState::new(
                authorized_user_id,
                Instant::now(),
            ))),
            authorized_user_id,
            config: Arc::new(config),
            classifier,
            recorder,
            status: Arc::new(watch::channel(String::new()).0),
            events,
        }
    }

    /// Latest presence status line. Empty until the first status tick.
    pub fn status_updates(&self) -> watch::Receiver<String> {
        self.status.subscribe()
    }

    pub fn authorized_user_id(&self) -> UserId {
        self.authorized_user_id
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Consistent copy of the whole state.
    pub async fn snapshot(&self) -> ControllerState {
        self.state.lock().await.clone()
    }

    pub async fn mode(&self) -> GuardMode {
        self.state.lock().await.mode
    }

    pub async fn debug_status(&self) -> String {
        self.state.lock().await.debug_status.clone()
    }

    pub async fn absence_event_count(&self) -> u32 {
        self.state.lock().await.absence_event_count
    }

    pub async fn record_input(&self, at: Instant) {
        self.state.lock().await.record_input(at);
    }

    /// `true` if the authorized user was verified less than `window` before `now`.
    pub async fn verified_within(&self, window: Duration, now: Instant) -> bool {
        self.state.lock().await.verified_within(window, now)
    }

    /// Runs one full tick for a freshly captured frame.
    pub async fn process_frame(&self, frame: Frame) -> Result<TickDecision> {
        {
            let mut state = self.state.lock().await;
            if state.consume_warmup(self.config.warmup_tick_count) {
                state.debug_status = "Camera Warmup...".to_string();
                return Ok(TickDecision::Warmup);
            }
        }

        let classifier = Arc::clone(&self.classifier);
        let observations = tokio::task::spawn_blocking({
            let frame = frame.clone();
            move || classifier.classify(&frame)
        })
        .await
        .context("classifier worker join failed")?
        .context("face classification failed")?;

        Ok(self.apply_tick(&frame, &observations, Instant::now()).await)
    }

    /// Applies classifier output for `frame` observed at `now`.
    pub async fn apply_tick(
        &self,
        frame: &Frame,
        observations: &[FaceObservation],
        now: Instant,
    ) -> TickDecision {
        let tick = classify_observations(
            observations,
            self.authorized_user_id,
            &self.config,
            self.classifier.identifies(),
        );

        let decision = {
            let mut state = self.state.lock().await;
            evaluate_tick(&mut state, &self.config, &tick, now)
        };

        match decision {
            TickDecision::Status(status) => {
                self.status.send_replace(status.to_string());
            }
            TickDecision::Strike(count) => {
                warn!("unauthorized person in frame x{count}");
            }
            TickDecision::Lock(reason) => self.finish_lock(reason, frame).await,
            TickDecision::Warmup | TickDecision::Held => {}
        }

        decision
    }

    /// Ends the current lock episode. Only the unlock protocol calls this.
    pub(crate) async fn unlock(&self) -> bool {
        let was_locked = self.state.lock().await.end_lock(Instant::now());
        if was_locked {
            info!("session unlocked for user {}", self.authorized_user_id);
            self.emit(SentinelEvent::Unlocked);
        }
        was_locked
    }

    async fn finish_lock(&self, reason: LockReason, frame: &Frame) {
        let message = lock_message(reason, &self.config);
        warn!("LOCK TRIGGERED: {message}");

        let event = self.recorder.record(reason, message, frame).await;
        self.emit(SentinelEvent::Locked(event));
    }

    fn emit(&self, event: SentinelEvent) {
        // Never wait on the reader; the state and the journal stay authoritative.
        match self.events.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                error!("event queue full, dropping {event:?}");
            }
        }
    }
}

fn lock_message(reason: LockReason, config: &SentinelConfig) -> String {
    match reason {
        LockReason::IntruderDetected => "SECURITY ALERT: Unauthorized Person!".to_string(),
        LockReason::AbsenceTimeout => format!(
            "Auto-Lock: Absent for > {}s",
            config.absence_lock_timeout().as_secs()
        ),
        LockReason::GhostInput => "Ghost Input Detected!".to_string(),
    }
}

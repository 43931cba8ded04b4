use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{anyhow, Context, Result};
use tokio_util::sync::CancellationToken;

use crate::vision::{Frame, FrameSource};

use super::controller::SentinelController;
use super::policy::TickDecision;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Camera handle shared with the blocking read workers.
pub type SharedFrameSource = Arc<StdMutex<Box<dyn FrameSource>>>;

pub fn share_frame_source(source: Box<dyn FrameSource>) -> SharedFrameSource {
    Arc::new(StdMutex::new(source))
}

/// Drives the controller at the configured tick rate until `cancel_token`
/// fires, then releases the camera.
pub async fn capture_loop(
    controller: SentinelController,
    source: SharedFrameSource,
    cancel_token: CancellationToken,
) {
    let tick_interval = controller.config().tick_interval();
    let backoff = controller.config().frame_retry_backoff();

    log_info!(
        "capture loop started for user {} ({}ms ticks)",
        controller.authorized_user_id(),
        tick_interval.as_millis()
    );

    loop {
        let frame = tokio::select! {
            result = read_frame(&source) => result,
            _ = cancel_token.cancelled() => break,
        };

        let pause = match frame {
            Ok(frame) => {
                match controller.process_frame(frame).await {
                    Ok(TickDecision::Lock(reason)) => log_info!("tick locked session: {reason}"),
                    Ok(decision) => log_debug!("tick: {decision:?}"),
                    Err(err) => log_error!("tick failed: {err:?}"),
                }
                tick_interval
            }
            Err(err) => {
                log_warn!("camera read failed, retrying in {}ms: {err:?}", backoff.as_millis());
                backoff
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(pause) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("capture loop shutting down");
    if let Err(err) = release_source(source).await {
        log_error!("failed to release camera: {err:?}");
    }
}

async fn read_frame(source: &SharedFrameSource) -> Result<Frame> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || {
        let mut guard = source
            .lock()
            .map_err(|_| anyhow!("frame source lock poisoned"))?;
        guard.read_frame()
    })
    .await
    .context("camera read worker join failed")?
}

/// Releases the camera on a blocking worker.
pub async fn release_source(source: SharedFrameSource) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        // Blocks until any in-flight read finishes.
        let mut guard = source
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.release();
    })
    .await
    .context("camera release worker join failed")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use anyhow::bail;
    use image::RgbImage;
    use tokio::time::Duration;

    use super::*;
    use crate::sentinel::{event_channel, BreachRecorder, GuardMode, SentinelConfig};
    use crate::vision::{Classifier, FaceObservation};

    struct ScriptedCamera {
        reads: Arc<AtomicUsize>,
        failures_first: usize,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedCamera {
        fn read_frame(&mut self) -> Result<Frame> {
            let attempt = self.reads.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_first {
                bail!("device busy");
            }
            Ok(Frame::new(RgbImage::new(2, 2)))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct AlwaysUser;

    impl Classifier for AlwaysUser {
        fn classify(&self, _frame: &Frame) -> Result<Vec<FaceObservation>> {
            Ok(vec![FaceObservation::identified(1, 40.0)])
        }
    }

    fn fast_controller(dir: &tempfile::TempDir) -> SentinelController {
        let config = SentinelConfig {
            warmup_tick_count: 0,
            tick_interval_ms: 5,
            frame_retry_backoff_ms: 5,
            ..SentinelConfig::default()
        };
        let (tx, _rx) = event_channel();
        SentinelController::new(
            1,
            config,
            Arc::new(AlwaysUser),
            BreachRecorder::new(dir.path().join("breach_images")),
            tx,
        )
    }

    #[tokio::test]
    async fn loop_retries_failed_reads_and_releases_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let reads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let camera = ScriptedCamera {
            reads: reads.clone(),
            failures_first: 2,
            released: released.clone(),
        };

        let controller = fast_controller(&dir);
        let mut status = controller.status_updates();

        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            controller.clone(),
            share_frame_source(Box::new(camera)),
            token.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), status.changed())
            .await
            .expect("status within timeout")
            .expect("controller alive");
        assert_eq!(*status.borrow(), "Active — Verified");
        assert!(reads.load(Ordering::SeqCst) >= 3);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after cancel")
            .unwrap();
        assert!(released.load(Ordering::SeqCst));

        let state = controller.snapshot().await;
        assert_eq!(state.mode, GuardMode::Monitoring);
        assert_eq!(state.consecutive_unknown_count, 0);
        assert_eq!(state.absence_event_count, 0);
    }

    #[tokio::test]
    async fn failed_reads_leave_lock_state_alone() {
        let dir = tempfile::tempdir().unwrap();
        let reads = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicBool::new(false));
        let camera = ScriptedCamera {
            reads: reads.clone(),
            failures_first: usize::MAX,
            released: released.clone(),
        };

        let controller = fast_controller(&dir);
        let status = controller.status_updates();
        let token = CancellationToken::new();
        let handle = tokio::spawn(capture_loop(
            controller.clone(),
            share_frame_source(Box::new(camera)),
            token.clone(),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while reads.load(Ordering::SeqCst) < 5 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reads retried");
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop exits after cancel")
            .unwrap();

        let state = controller.snapshot().await;
        assert_eq!(state.mode, GuardMode::Monitoring);
        assert_eq!(state.consecutive_unknown_count, 0);
        assert_eq!(state.absence_event_count, 0);
        assert_eq!(state.ticks_seen, 0);
        assert_eq!(state.debug_status, "Ready");
        assert!(!status.has_changed().unwrap());
        assert!(released.load(Ordering::SeqCst));
    }
}

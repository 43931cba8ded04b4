use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::ImageFormat;
use log::{error, info};

use crate::db::{Database, LockEvent, LockReason};
use crate::vision::Frame;

#[derive(Clone)]
struct Journal {
    db: Database,
    session_id: String,
}

/// Writes the triggering frame of each lock to disk and, when attached to a
/// session, records the lock in the database.
#[derive(Clone)]
pub struct BreachRecorder {
    snapshot_dir: Arc<PathBuf>,
    journal: Option<Journal>,
}

impl BreachRecorder {
    pub fn new(snapshot_dir: impl Into<PathBuf>) -> Self {
        Self {
            snapshot_dir: Arc::new(snapshot_dir.into()),
            journal: None,
        }
    }

    pub fn with_journal(mut self, db: Database, session_id: impl Into<String>) -> Self {
        self.journal = Some(Journal {
            db,
            session_id: session_id.into(),
        });
        self
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.snapshot_dir.as_path()
    }

    /// Saves `frame` as `breach_<unix-ts>.jpg`. Blocking.
    pub fn capture(&self, frame: &Frame, at: DateTime<Utc>) -> Result<PathBuf> {
        fs::create_dir_all(self.snapshot_dir.as_path()).with_context(|| {
            format!(
                "failed to create breach directory {}",
                self.snapshot_dir.display()
            )
        })?;

        let path = self
            .snapshot_dir
            .join(format!("breach_{}.jpg", at.timestamp()));
        frame
            .image()
            .save_with_format(&path, ImageFormat::Jpeg)
            .with_context(|| format!("failed to write breach snapshot {}", path.display()))?;
        Ok(path)
    }

    /// Builds the lock event for `reason`. Never fails: a snapshot or journal
    /// error is logged and the event goes out without it.
    pub async fn record(&self, reason: LockReason, message: String, frame: &Frame) -> LockEvent {
        let timestamp = Utc::now();

        let recorder = self.clone();
        let frame = frame.clone();
        let snapshot =
            match tokio::task::spawn_blocking(move || recorder.capture(&frame, timestamp)).await {
                Ok(Ok(path)) => {
                    info!("breach snapshot saved to {}", path.display());
                    Some(path)
                }
                Ok(Err(err)) => {
                    error!("lock snapshot failed ({reason}): {err:?}");
                    None
                }
                Err(join_err) => {
                    error!("lock snapshot worker join failed: {join_err}");
                    None
                }
            };

        let event = LockEvent {
            reason,
            message,
            timestamp,
            snapshot,
        };

        if let Some(journal) = &self.journal {
            if let Err(err) = journal.db.insert_lock_event(&journal.session_id, &event).await {
                error!(
                    "failed to journal lock event for session {}: {err:?}",
                    journal.session_id
                );
            }
        }

        event
    }
}

#[cfg(test)]
mod tests {
    use image::RgbImage;

    use super::*;

    fn frame() -> Frame {
        Frame::new(RgbImage::from_pixel(8, 8, image::Rgb([200, 40, 40])))
    }

    #[tokio::test]
    async fn snapshot_lands_in_breach_dir() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = BreachRecorder::new(dir.path().join("breach_images"));

        let event = recorder
            .record(LockReason::IntruderDetected, "intruder".into(), &frame())
            .await;

        let path = event.snapshot.expect("snapshot path");
        assert!(path.starts_with(dir.path().join("breach_images")));
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("breach_") && name.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn unwritable_dir_yields_event_without_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"occupied").unwrap();
        let recorder = BreachRecorder::new(&blocker);

        let event = recorder
            .record(LockReason::AbsenceTimeout, "absent".into(), &frame())
            .await;

        assert_eq!(event.reason, LockReason::AbsenceTimeout);
        assert!(event.snapshot.is_none());
    }

    #[tokio::test]
    async fn journal_receives_lock_event() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("guard.sqlite3")).unwrap();
        let session_id = db.start_session(1).await.unwrap();
        let recorder =
            BreachRecorder::new(dir.path().join("breach_images")).with_journal(db.clone(), &session_id);

        recorder
            .record(LockReason::GhostInput, "ghost".into(), &frame())
            .await;

        let records = db.lock_events_for_session(&session_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].event.reason, LockReason::GhostInput);
        assert!(records[0].event.snapshot.is_some());
    }
}

//! Camera frames and the face classifier seam.
//!
//! Detection and identification live outside this crate. The sentinel only
//! sees what a [`Classifier`] reports for each frame.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::sentinel::UserId;

/// One captured camera frame. Clones share the pixel buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self::captured(image, Utc::now())
    }

    pub fn captured(image: RgbImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            image: Arc::new(image),
            captured_at,
        }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A face found in a single frame. Never outlives the tick that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceObservation {
    /// Best-matching enrolled user, if the model produced one.
    pub identity: Option<UserId>,
    /// Dissimilarity to `identity`; lower is a closer match.
    pub confidence_score: f64,
    pub bounding_box: BoundingBox,
}

impl FaceObservation {
    pub fn identified(identity: UserId, confidence_score: f64) -> Self {
        Self {
            identity: Some(identity),
            confidence_score,
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn unidentified() -> Self {
        Self {
            identity: None,
            confidence_score: f64::MAX,
            bounding_box: BoundingBox::default(),
        }
    }

    pub fn with_bounding_box(mut self, bounding_box: BoundingBox) -> Self {
        self.bounding_box = bounding_box;
        self
    }
}

/// Face detection and identification backend.
///
/// `classify` is called from a blocking worker, once per tick, and may take
/// tens of milliseconds.
pub trait Classifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<Vec<FaceObservation>>;

    /// `false` when no trained model is loaded and faces are only detected.
    /// Identities reported in that state are meaningless.
    fn identifies(&self) -> bool {
        true
    }
}

/// Blocking camera handle.
pub trait FrameSource: Send {
    fn read_frame(&mut self) -> Result<Frame>;

    /// Gives the device back to the OS. Called once when monitoring stops.
    fn release(&mut self) {}
}

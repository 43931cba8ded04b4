//! MedGuard: continuous authentication for a single workstation session.
//!
//! A [`SentinelController`] watches camera frames and locks the session when
//! the enrolled user leaves, a stranger appears, or input arrives with nobody
//! in front of the camera. [`UnlockProtocol`] is the way back: password first,
//! then a fresh face match.
//!
//! Camera, face classifier, input hooks and password storage are injected
//! through the [`FrameSource`], [`Classifier`], [`ActivityMonitor`] and
//! [`CredentialVerifier`] traits.

pub mod activity;
pub mod db;
pub mod device;
pub mod runtime;
pub mod sentinel;
pub mod session;
pub mod settings;
pub mod unlock;
mod utils;
pub mod vision;

pub use activity::{ActivityEvent, ActivityKind, ActivityMonitor};
pub use db::{Database, LockEvent, LockReason, Session, SessionStatus};
pub use device::DeviceBinding;
pub use runtime::{init_logging, reset_data, GuardRuntime};
pub use sentinel::{
    DetectionOnlyPolicy, GuardMode, SentinelConfig, SentinelController, SentinelEvent, UserId,
};
pub use session::{GuardHandle, GuardInputs, GuardSession};
pub use settings::{GuardSettings, SettingsStore};
pub use unlock::{CredentialVerifier, Sha256Credential, UnlockConfig, UnlockOutcome, UnlockProtocol};
pub use vision::{BoundingBox, Classifier, FaceObservation, Frame, FrameSource};

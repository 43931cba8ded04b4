pub mod breach;
pub mod config;
pub mod controller;
pub mod loop_worker;
pub mod policy;
pub mod state;

pub use breach::BreachRecorder;
pub use config::{DetectionOnlyPolicy, SentinelConfig};
pub use controller::{event_channel, SentinelController, SentinelEvent, EVENT_QUEUE_CAPACITY};
pub use loop_worker::{capture_loop, release_source, share_frame_source, SharedFrameSource};
pub use policy::{PresenceStatus, TickClassification, TickDecision};
pub use state::{ControllerState, GuardMode, UserId};

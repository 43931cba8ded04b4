pub mod lock_event;
pub mod session;

pub use lock_event::{LockEvent, LockEventRecord, LockReason};
pub use session::{Session, SessionStatus};

mod guard;

pub use guard::{GuardHandle, GuardInputs, GuardSession};

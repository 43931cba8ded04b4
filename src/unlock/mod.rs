pub mod config;
pub mod credentials;
pub mod protocol;

pub use config::UnlockConfig;
pub use credentials::{CredentialVerifier, Sha256Credential};
pub use protocol::{UnlockOutcome, UnlockProtocol};

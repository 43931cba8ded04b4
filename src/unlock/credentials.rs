use std::collections::HashMap;

use log::warn;
use sha2::{Digest, Sha256};

use crate::sentinel::UserId;

/// Password check for the knowledge factor of an unlock.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, user_id: UserId, attempt: &str) -> bool;
}

type Digest256 = [u8; 32];

/// Stored credentials as hex SHA-256 digests of the password.
#[derive(Debug, Clone, Default)]
pub struct Sha256Credential {
    /// `None` for a stored hash that is not 64 hex digits; it never matches.
    digests: HashMap<UserId, Option<Digest256>>,
}

impl Sha256Credential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an existing digest, e.g. one read from the user table.
    pub fn with_hash(mut self, user_id: UserId, stored_hash: impl AsRef<str>) -> Self {
        let digest = hex::decode(stored_hash.as_ref().trim())
            .ok()
            .and_then(|bytes| Digest256::try_from(bytes.as_slice()).ok());
        if digest.is_none() {
            warn!("stored password hash for user {user_id} is not a SHA-256 hex digest");
        }
        self.digests.insert(user_id, digest);
        self
    }

    pub fn with_password(self, user_id: UserId, password: &str) -> Self {
        self.with_hash(user_id, Self::hash_password(password))
    }

    pub fn hash_password(password: &str) -> String {
        hex::encode(digest_of(password))
    }
}

fn digest_of(password: &str) -> Digest256 {
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&Sha256::digest(password.as_bytes()));
    digest
}

/// Compares every byte regardless of where the first mismatch is.
fn digests_match(stored: &Digest256, attempt: &Digest256) -> bool {
    stored
        .iter()
        .zip(attempt)
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

impl CredentialVerifier for Sha256Credential {
    fn verify(&self, user_id: UserId, attempt: &str) -> bool {
        let Some(Some(stored)) = self.digests.get(&user_id) else {
            return false;
        };
        digests_match(stored, &digest_of(attempt))
    }
}

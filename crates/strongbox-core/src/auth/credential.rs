//! PIN credential storage and verification
//!
//! The credential is a `{salt, hash}` pair kept under two storage keys that
//! are always written in the same batch.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{GateError, Result};
use crate::storage::{SecureStorage, WriteBatch};

/// Storage key holding the PIN salt
pub const PIN_SALT_KEY: &str = "pin_salt";
/// Storage key holding the PIN hash
pub const PIN_HASH_KEY: &str = "pin_hash";

/// Hash a PIN with its salt: lowercase hex of `SHA-256(pin ":" salt)`
pub fn hash_pin(pin: &str, salt: &str) -> String {
    let input = Zeroizing::new(format!("{}:{}", pin, salt));
    hex::encode(Sha256::digest(input.as_bytes()))
}

/// Owns the PIN credential inside secure storage
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    /// Create a credential store over `storage`
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    /// Check if a PIN has been set (both salt and hash present)
    pub fn has_credential(&self) -> Result<bool> {
        Ok(self.storage.contains(PIN_SALT_KEY)? && self.storage.contains(PIN_HASH_KEY)?)
    }

    /// Set a new PIN, replacing any previous one
    ///
    /// Length policy is the caller's job (see
    /// [`validate_new_pin`](super::validate_new_pin)); only the empty PIN is
    /// refused here.
    pub fn set_credential(&self, pin: &str) -> Result<()> {
        if pin.is_empty() {
            return Err(GateError::InvalidPinLength(1));
        }

        let salt = Uuid::new_v4().to_string();
        let hash = hash_pin(pin, &salt);

        self.storage.write_batch(
            WriteBatch::new()
                .put_string(PIN_SALT_KEY, salt)
                .put_string(PIN_HASH_KEY, hash),
        )?;

        info!("PIN credential updated");
        Ok(())
    }

    /// Verify a PIN attempt against the stored credential
    ///
    /// Fails closed: any missing field or storage error yields `false`.
    pub fn verify(&self, pin_attempt: &str) -> bool {
        let (salt, stored) = match self.load() {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                debug!("PIN verification without a credential");
                return false;
            }
            Err(e) => {
                warn!("Could not read PIN credential: {}", e);
                return false;
            }
        };

        let attempt = hash_pin(pin_attempt, &salt);
        attempt.as_bytes().ct_eq(stored.as_bytes()).into()
    }

    fn load(&self) -> Result<Option<(String, String)>> {
        let salt = self.storage.get_string(PIN_SALT_KEY)?;
        let hash = self.storage.get_string(PIN_HASH_KEY)?;
        Ok(salt.zip(hash))
    }
}

//! Authentication for the Strongbox gate
//!
//! Provides PIN credentials and the unlock session. Verification and session
//! state are kept apart: [`CredentialStore::verify`] only answers whether a
//! PIN matches, and the caller decides whether to [`UnlockSession::unlock`].
//!
//! # Security Model
//!
//! - PIN is stored as `SHA-256(pin ":" salt)`, hex encoded
//! - Salt is a fresh random UUID on every PIN change
//! - Salt and hash are always written together in one batch
//! - Comparison against the stored hash is constant time
//! - Session state lives in memory only and starts locked

mod credential;
mod session;

pub use credential::{hash_pin, CredentialStore, PIN_HASH_KEY, PIN_SALT_KEY};
pub use session::{SessionState, UnlockMethod, UnlockSession};

use crate::error::GateError;

/// Default minimum PIN length
pub const MIN_PIN_LENGTH: usize = 4;

/// Overall authentication status of the gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum GateStatus {
    /// No PIN has been set yet (first run)
    #[default]
    SetupRequired,
    /// PIN exists, session is locked
    Locked,
    /// Session is unlocked
    Unlocked,
}

impl std::fmt::Display for GateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SetupRequired => write!(f, "setup required"),
            Self::Locked => write!(f, "locked"),
            Self::Unlocked => write!(f, "unlocked"),
        }
    }
}

/// Authentication failure kinds
///
/// None of these change session state; the user may retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Incorrect PIN")]
    IncorrectPin,

    #[error("Biometric authentication unavailable: {0}")]
    BiometricUnavailable(String),

    #[error("Biometric authentication failed")]
    BiometricFailed,

    #[error("Biometric authentication cancelled")]
    BiometricCancelled,
}

/// Validate a new PIN and its confirmation before it is stored
pub fn validate_new_pin(pin: &str, confirmation: &str, min_length: usize) -> Result<(), GateError> {
    let min_length = min_length.max(1);
    if pin.chars().count() < min_length {
        return Err(GateError::InvalidPinLength(min_length));
    }

    if pin != confirmation {
        return Err(GateError::PinMismatch);
    }

    Ok(())
}

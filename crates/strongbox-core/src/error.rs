//! Error types for the Strongbox gate

use thiserror::Error;

use crate::auth::AuthError;

/// Result type alias for gate operations
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors raised by a [`SecureStorage`](crate::storage::SecureStorage) backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A key holds a value of a different kind than requested
    #[error("Key '{key}' does not hold a {expected} value")]
    TypeMismatch {
        key: String,
        expected: &'static str,
    },

    /// Backend-specific failure (poisoned lock, unavailable keystore, ...)
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Errors surfaced to the UI layer by the gate
#[derive(Debug, Error)]
pub enum GateError {
    /// PIN shorter than the configured minimum
    #[error("PIN must be at least {0} characters")]
    InvalidPinLength(usize),

    /// PIN and confirmation differ
    #[error("PINs do not match")]
    PinMismatch,

    /// No credential exists yet; a PIN must be set first
    #[error("PIN not set up - run initialization first")]
    SetupRequired,

    /// The operation needs an unlocked session
    #[error("Session is locked - unlock first")]
    SessionLocked,

    /// Authentication did not succeed
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Underlying storage failed; the triggering action did not take effect
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The platform failed to start a resource
    #[error("Launch failed for {id}: {reason}")]
    Launch { id: String, reason: String },

    /// Configuration could not be loaded or saved
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GateError {
    /// Whether the user can simply try again (wrong PIN, cancelled prompt, bad input)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GateError::InvalidPinLength(_) | GateError::PinMismatch | GateError::Auth(_)
        )
    }
}

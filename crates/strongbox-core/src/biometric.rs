//! Biometric capability
//!
//! The platform sensor and prompt are external. The gate only needs to know
//! whether the capability is usable right now and, when challenged, which of
//! success, failure or cancellation happened.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::warn;

/// Availability of the biometric capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiometricStatus {
    /// Whether a challenge can be started
    pub available: bool,
    /// Why the capability is unavailable (if not available)
    pub unavailable_reason: Option<String>,
}

impl BiometricStatus {
    /// Status for a usable sensor
    pub fn available() -> Self {
        Self {
            available: true,
            unavailable_reason: None,
        }
    }

    /// Status for a missing or unenrolled sensor
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            available: false,
            unavailable_reason: Some(reason.into()),
        }
    }
}

/// How a biometric challenge ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricOutcome {
    /// The user matched
    Success,
    /// The sensor rejected the user
    Failed,
    /// The user or the system dismissed the prompt
    Cancelled,
}

/// Platform biometric prompt
#[async_trait]
pub trait BiometricGate: Send + Sync {
    /// Current availability (hardware present and enrolled)
    fn status(&self) -> BiometricStatus;

    fn is_available(&self) -> bool {
        self.status().available
    }

    /// Show the prompt and wait for its result
    async fn challenge(&self) -> BiometricOutcome;
}

/// Gate for hosts without any biometric hardware
#[derive(Debug, Clone, Default)]
pub struct NoBiometric;

#[async_trait]
impl BiometricGate for NoBiometric {
    fn status(&self) -> BiometricStatus {
        BiometricStatus::unavailable("no biometric hardware on this host")
    }

    async fn challenge(&self) -> BiometricOutcome {
        BiometricOutcome::Cancelled
    }
}

/// Handle to a biometric challenge running in the background
///
/// Lets the caller tell "still pending" apart from a finished challenge
/// without blocking other gate decisions.
#[derive(Debug)]
pub struct PendingChallenge {
    handle: JoinHandle<BiometricOutcome>,
}

impl PendingChallenge {
    pub(crate) fn new(handle: JoinHandle<BiometricOutcome>) -> Self {
        Self { handle }
    }

    /// Whether the challenge has not resolved yet
    pub fn is_pending(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the challenge to resolve
    ///
    /// A task that panicked or was aborted is reported as cancelled.
    pub async fn outcome(self) -> BiometricOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("biometric challenge task ended abnormally: {}", e);
                BiometricOutcome::Cancelled
            }
        }
    }
}

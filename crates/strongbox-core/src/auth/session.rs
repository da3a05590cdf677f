//! Unlock session state
//!
//! The session is process scoped: it starts locked and is never persisted.
//! State lives in a `watch` channel so transitions are applied atomically
//! and observers (a UI, the CLI shell) are woken only on real changes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

/// Lock state of the current process session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Locked,
    Unlocked,
}

impl SessionState {
    /// Whether protected resources may be launched
    pub fn is_unlocked(self) -> bool {
        self == SessionState::Unlocked
    }
}

/// What caused an unlock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockMethod {
    Pin,
    Biometric,
}

/// Shared holder of the session state
///
/// Cloning yields another handle to the same session.
#[derive(Clone, Debug)]
pub struct UnlockSession {
    state: Arc<watch::Sender<SessionState>>,
}

impl UnlockSession {
    /// Create a locked session
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Locked);
        Self {
            state: Arc::new(state),
        }
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Whether the session is unlocked
    pub fn is_unlocked(&self) -> bool {
        self.state().is_unlocked()
    }

    /// Transition to `Unlocked`
    ///
    /// Returns `true` if the state changed; unlocking an unlocked session is
    /// a no-op.
    pub fn unlock(&self, method: UnlockMethod) -> bool {
        let changed = self.transition(SessionState::Unlocked);
        if changed {
            info!(?method, "session unlocked");
        } else {
            debug!(?method, "session already unlocked");
        }
        changed
    }

    /// Transition to `Locked`; returns `true` if the state changed
    pub fn lock(&self) -> bool {
        let changed = self.transition(SessionState::Locked);
        if changed {
            info!("session locked");
        }
        changed
    }

    /// Watch for state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, next: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }
}

impl Default for UnlockSession {
    fn default() -> Self {
        Self::new()
    }
}

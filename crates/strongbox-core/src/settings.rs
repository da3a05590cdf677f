//! User settings persisted next to the credential

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::storage::{SecureStorage, WriteBatch};

/// Storage key holding the biometric toggle
pub const BIOMETRIC_ENABLED_KEY: &str = "biometric_enabled";

/// Biometric unlock is on until the user turns it off
pub const DEFAULT_BIOMETRIC_ENABLED: bool = true;

/// Owns the biometric toggle; independent of lock state
#[derive(Clone)]
pub struct Settings {
    storage: Arc<dyn SecureStorage>,
}

impl Settings {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    pub fn is_biometric_enabled(&self) -> Result<bool> {
        Ok(self
            .storage
            .get_bool(BIOMETRIC_ENABLED_KEY, DEFAULT_BIOMETRIC_ENABLED)?)
    }

    pub fn set_biometric_enabled(&self, enabled: bool) -> Result<()> {
        self.storage
            .write_batch(WriteBatch::new().put_bool(BIOMETRIC_ENABLED_KEY, enabled))?;
        info!(enabled, "biometric unlock setting changed");
        Ok(())
    }

    /// Flip the toggle and return the new value
    pub fn toggle_biometric(&self) -> Result<bool> {
        let enabled = !self.is_biometric_enabled()?;
        self.set_biometric_enabled(enabled)?;
        Ok(enabled)
    }
}

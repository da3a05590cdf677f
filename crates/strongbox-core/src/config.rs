//! Gate configuration

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::MIN_PIN_LENGTH;
use crate::error::{GateError, Result};

/// Directory name used under the platform data/config directories
pub const APP_DIR_NAME: &str = "strongbox";

/// Gate configuration options
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateConfig {
    /// Location of the secure storage document
    #[serde(default = "GateConfig::default_storage_path")]
    pub storage_path: PathBuf,

    /// Minimum accepted PIN length when setting a credential
    #[serde(default = "default_min_pin_length")]
    pub min_pin_length: usize,

    /// Start a biometric challenge automatically when the gate opens
    #[serde(default = "default_auto_biometric")]
    pub auto_biometric: bool,
}

fn default_min_pin_length() -> usize {
    MIN_PIN_LENGTH
}

fn default_auto_biometric() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            storage_path: Self::default_storage_path(),
            min_pin_length: MIN_PIN_LENGTH,
            auto_biometric: true,
        }
    }
}

impl GateConfig {
    /// Default storage location: `<data dir>/strongbox/vault.json`
    pub fn default_storage_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR_NAME)
            .join("vault.json")
    }

    /// Create config with a custom storage path
    pub fn with_storage_path(path: PathBuf) -> Self {
        Self {
            storage_path: path,
            ..Default::default()
        }
    }

}

/// Read a JSON configuration document
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| GateError::Config(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&content)
        .map_err(|e| GateError::Config(format!("{}: {}", path.display(), e)))
}

/// Write a JSON configuration document, creating the parent directory
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let content =
        serde_json::to_string_pretty(value).map_err(|e| GateError::Config(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| GateError::Config(e.to_string()))?;
    }
    fs::write(path, content).map_err(|e| GateError::Config(format!("{}: {}", path.display(), e)))
}

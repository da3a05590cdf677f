//! CLI configuration
//!
//! Extends the gate configuration with the list of resources this host can
//! launch, since a terminal has no installed-application registry to ask.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strongbox_core::config::{load_json, save_json, APP_DIR_NAME};
use strongbox_core::GateConfig;

/// Configuration file name
const CONFIG_FILE_NAME: &str = "config.json";

/// A command the CLI knows how to launch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfiguredResource {
    /// Display label
    pub label: String,
    /// Resource identifier used for protection
    pub id: String,
    /// Program to execute
    pub command: String,
    /// Program arguments
    #[serde(default)]
    pub args: Vec<String>,
}

/// Configuration persisted across runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub gate: GateConfig,

    #[serde(default)]
    pub resources: Vec<ConfiguredResource>,
}

impl CliConfig {
    /// Get the configuration directory path
    pub fn config_dir() -> Option<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg_config).join(APP_DIR_NAME));
        }

        dirs::config_dir().map(|p| p.join(APP_DIR_NAME))
    }

    /// Get the full config file path
    pub fn config_file_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or defaults when the file does not exist
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        Ok(load_json(path)?)
    }

    /// Save to `path`, creating the parent directory
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_json(self, path)?;
        Ok(())
    }
}

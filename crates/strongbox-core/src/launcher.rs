//! Launchable resources
//!
//! Enumerating installed applications and starting them is platform work;
//! [`ResourceLauncher`] is the seam. [`ResourceCatalog`] caches the listing
//! as a snapshot that only changes on an explicit refresh.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::registry::ResourceId;

/// A launchable resource as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Display label
    pub label: String,
    /// Unique identifier
    pub id: ResourceId,
}

impl ResourceInfo {
    pub fn new(label: impl Into<String>, id: impl Into<ResourceId>) -> Self {
        Self {
            label: label.into(),
            id: id.into(),
        }
    }
}

/// Result of asking the platform to start a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchResult {
    Launched,
    NotFound,
}

/// Platform enumeration and launch mechanism
pub trait ResourceLauncher: Send + Sync {
    /// Resources that can currently be launched (a snapshot, in any order)
    fn list_launchable(&self) -> Result<Vec<ResourceInfo>>;

    /// Start the resource identified by `id`
    fn launch(&self, id: &str) -> Result<LaunchResult>;
}

/// Cached, label-sorted listing of launchable resources
#[derive(Clone)]
pub struct ResourceCatalog {
    launcher: Arc<dyn ResourceLauncher>,
    snapshot: Arc<RwLock<Option<Vec<ResourceInfo>>>>,
}

impl ResourceCatalog {
    pub fn new(launcher: Arc<dyn ResourceLauncher>) -> Self {
        Self {
            launcher,
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    /// Cached listing, fetched on first use
    pub fn resources(&self) -> Result<Vec<ResourceInfo>> {
        if let Some(cached) = self.read_snapshot() {
            return Ok(cached);
        }
        self.refresh()
    }

    /// Re-enumerate resources and replace the cached snapshot
    pub fn refresh(&self) -> Result<Vec<ResourceInfo>> {
        let mut resources = self.launcher.list_launchable()?;
        resources.sort_by_key(|r| r.label.to_lowercase());
        debug!(count = resources.len(), "resource snapshot refreshed");

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Some(resources.clone());
        Ok(resources)
    }

    /// Hand `id` to the platform launcher
    pub fn launch(&self, id: &str) -> Result<LaunchResult> {
        self.launcher.launch(id)
    }

    fn read_snapshot(&self) -> Option<Vec<ResourceInfo>> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

//! Launcher that runs configured commands

use std::io;
use std::process::{Command, Stdio};

use strongbox_core::{GateError, LaunchResult, ResourceInfo, ResourceLauncher};
use tracing::debug;

use crate::config::ConfiguredResource;

/// Launches resources by spawning the configured program, detached
pub struct CommandLauncher {
    resources: Vec<ConfiguredResource>,
}

impl CommandLauncher {
    pub fn new(resources: Vec<ConfiguredResource>) -> Self {
        Self { resources }
    }
}

impl ResourceLauncher for CommandLauncher {
    fn list_launchable(&self) -> strongbox_core::Result<Vec<ResourceInfo>> {
        Ok(self
            .resources
            .iter()
            .map(|r| ResourceInfo::new(r.label.clone(), r.id.clone()))
            .collect())
    }

    fn launch(&self, id: &str) -> strongbox_core::Result<LaunchResult> {
        let Some(resource) = self.resources.iter().find(|r| r.id == id) else {
            return Ok(LaunchResult::NotFound);
        };

        debug!(resource = id, command = %resource.command, "spawning");
        match Command::new(&resource.command)
            .args(&resource.args)
            .stdin(Stdio::null())
            .spawn()
        {
            Ok(_child) => Ok(LaunchResult::Launched),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(LaunchResult::NotFound),
            Err(e) => Err(GateError::Launch {
                id: id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

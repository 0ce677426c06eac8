//! Read-only inputs of a build

use crate::error::{BuildError, Result};
use crate::executor::CommandExecutor;
use crate::settings::BuildSettings;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vmflow_api::{Gateway, VmSpec};

/// Everything a step may read but never changes
pub struct BuildContext {
    pub gateway: Arc<dyn Gateway>,
    /// Guest transport; `None` when the build runs without a communicator
    pub executor: Option<Arc<dyn CommandExecutor>>,
    pub spec: VmSpec,
    pub settings: BuildSettings,
    /// Commands run in the guest once it is reachable
    pub provision_commands: Vec<String>,
    /// In-guest shutdown command; `None` leaves the VM running
    pub shutdown_command: Option<String>,
    pub cancel: CancellationToken,
}

impl BuildContext {
    pub fn new(gateway: Arc<dyn Gateway>, spec: VmSpec) -> Self {
        Self {
            gateway,
            executor: None,
            spec,
            settings: BuildSettings::default(),
            provision_commands: Vec::new(),
            shutdown_command: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_settings(mut self, settings: BuildSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_provision_commands(mut self, commands: Vec<String>) -> Self {
        self.provision_commands = commands;
        self
    }

    pub fn with_shutdown_command(mut self, command: Option<String>) -> Self {
        self.shutdown_command = command.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sleep unless the build is cancelled first
    pub async fn sleep(&self, duration: Duration, step: &'static str) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancel.cancelled() => Err(BuildError::Cancelled { step }),
        }
    }
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("vm", &self.spec.name)
            .field("executor", &self.executor.is_some())
            .field("settings", &self.settings)
            .field("provision_commands", &self.provision_commands.len())
            .field("shutdown_command", &self.shutdown_command)
            .finish()
    }
}

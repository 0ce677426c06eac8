//! Connect to the guest and run provisioning commands

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::BuildState;
use crate::step::Step;
use async_trait::async_trait;

/// Opens a session to the discovered address and runs each provision
/// command in order. The session stays open for the shutdown coordinator.
#[derive(Debug, Default)]
pub struct ProvisionStep;

impl ProvisionStep {
    pub const NAME: &'static str = "provision";
}

#[async_trait]
impl Step for ProvisionStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        let Some(executor) = ctx.executor.clone() else {
            tracing::debug!("No communicator configured, skipping provisioning");
            return Ok(());
        };
        let host = state
            .address
            .as_ref()
            .map(|a| a.host.clone())
            .ok_or(BuildError::MissingState("address"))?;

        tracing::info!("Connecting to {}", host);
        let session = tokio::select! {
            result = executor.connect(&host) => result.map_err(|cause| BuildError::Connect {
                host: host.clone(),
                cause,
            })?,
            _ = ctx.cancel.cancelled() => return Err(BuildError::Cancelled { step: Self::NAME }),
        };

        for (i, command) in ctx.provision_commands.iter().enumerate() {
            tracing::info!("Provisioning [{}/{}]: {}", i + 1, ctx.provision_commands.len(), command);
            let mut handle = session.start(command).await?;
            let exit_status = tokio::select! {
                result = handle.wait() => result?,
                _ = ctx.cancel.cancelled() => return Err(BuildError::Cancelled { step: Self::NAME }),
            };
            if exit_status != 0 {
                return Err(BuildError::ProvisionCommandFailed {
                    command: command.clone(),
                    exit_status,
                });
            }
        }

        state.session = Some(session);
        Ok(())
    }
}

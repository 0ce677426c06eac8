//! Shutdown for builds without a guest communicator

use super::shutdown::{ShutdownReport, ShutdownState, force_off, verify};
use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::BuildState;
use crate::step::Step;
use async_trait::async_trait;

/// Powers the VM off through the API directly
#[derive(Debug, Default)]
pub struct SimpleShutdownStep;

impl SimpleShutdownStep {
    pub const NAME: &'static str = "simple-shutdown";
}

#[async_trait]
impl Step for SimpleShutdownStep {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        let key = state
            .vm_key
            .clone()
            .ok_or(BuildError::MissingState("vm key"))?;

        let mut report = ShutdownReport::default();
        force_off(ctx, state, &key).await;
        report.enter(ShutdownState::ForcedOff);
        report.still_running = verify(ctx, state, &key).await;
        report.enter(ShutdownState::Verified);
        state.shutdown = Some(report);
        Ok(())
    }
}

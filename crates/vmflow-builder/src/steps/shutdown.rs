//! Graceful shutdown with forced power-off fallback
//!
//! ```text
//! Idle ─► CommandIssued ─► CommandSucceeded ─► Draining ─────────────► Verified
//!   │           │
//!   │           └─► CommandFailed | Timeout ─┐
//!   └─► IssueFailed ─────────────────────────┴─► ForcedOff ─► Verified
//!
//! Idle ─► SkippedByConfig   (no shutdown command)
//! ```
//!
//! Nothing past issuing the command can fail the build: the artifact already
//! exists. Inconclusive verification and a failed forced power-off are
//! recorded as warnings.

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::BuildState;
use crate::step::Step;
use async_trait::async_trait;
use serde::Serialize;
use vmflow_api::{PowerAction, VmKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownState {
    Idle,
    CommandIssued,
    CommandSucceeded,
    Draining,
    CommandFailed,
    Timeout,
    IssueFailed,
    ForcedOff,
    Verified,
    SkippedByConfig,
}

impl ShutdownState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShutdownState::Verified | ShutdownState::SkippedByConfig)
    }
}

/// Path the coordinator took, plus what verification saw
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    pub transitions: Vec<ShutdownState>,
    /// Result of the final running-state read; `None` when it failed or was skipped
    pub still_running: Option<bool>,
}

impl Default for ShutdownReport {
    fn default() -> Self {
        Self {
            transitions: vec![ShutdownState::Idle],
            still_running: None,
        }
    }
}

impl ShutdownReport {
    pub fn state(&self) -> ShutdownState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(ShutdownState::Idle)
    }

    pub fn was_forced(&self) -> bool {
        self.transitions.contains(&ShutdownState::ForcedOff)
    }

    pub(crate) fn enter(&mut self, next: ShutdownState) {
        tracing::debug!("Shutdown: {:?} -> {:?}", self.state(), next);
        self.transitions.push(next);
    }
}

/// Four-phase shutdown: issue, await, drain, verify
#[derive(Debug, Default)]
pub struct ShutdownCoordinator;

impl ShutdownCoordinator {
    pub const NAME: &'static str = "shutdown";
}

#[async_trait]
impl Step for ShutdownCoordinator {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        let mut report = ShutdownReport::default();

        let Some(command) = ctx.shutdown_command.as_deref() else {
            tracing::info!("No shutdown command configured, leaving VM running");
            report.enter(ShutdownState::SkippedByConfig);
            state.shutdown = Some(report);
            return Ok(());
        };
        let key = state
            .vm_key
            .clone()
            .ok_or(BuildError::MissingState("vm key"))?;

        // Phase 1: issue
        tracing::info!("Sending shutdown command: {}", command);
        let session = state.session.take();
        let issued = match &session {
            Some(session) => session.start(command).await.map_err(|e| e.to_string()),
            None => Err("no open guest session".to_string()),
        };

        let graceful = match issued {
            Err(reason) => {
                tracing::warn!("Could not issue shutdown command: {}", reason);
                report.enter(ShutdownState::IssueFailed);
                false
            }
            Ok(mut handle) => {
                report.enter(ShutdownState::CommandIssued);

                // Phase 2: await
                let waited = tokio::select! {
                    result = tokio::time::timeout(ctx.settings.shutdown_timeout, handle.wait()) => result,
                    _ = ctx.cancel.cancelled() => return Err(BuildError::Cancelled { step: Self::NAME }),
                };
                match waited {
                    Ok(Ok(0)) => {
                        report.enter(ShutdownState::CommandSucceeded);
                        true
                    }
                    Ok(Ok(code)) => {
                        tracing::warn!("Shutdown command exited with status {}", code);
                        report.enter(ShutdownState::CommandFailed);
                        false
                    }
                    Ok(Err(e)) => {
                        tracing::warn!("Shutdown command failed: {}", e);
                        report.enter(ShutdownState::CommandFailed);
                        false
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Shutdown command did not finish within {:?}",
                            ctx.settings.shutdown_timeout
                        );
                        report.enter(ShutdownState::Timeout);
                        false
                    }
                }
            }
        };
        drop(session);

        if graceful {
            // Phase 3: the command returning does not mean the OS is down
            report.enter(ShutdownState::Draining);
            tracing::info!("Waiting {:?} for the guest to power down", ctx.settings.shutdown_drain);
            ctx.sleep(ctx.settings.shutdown_drain, Self::NAME).await?;
        } else {
            force_off(ctx, state, &key).await;
            report.enter(ShutdownState::ForcedOff);
        }

        // Phase 4: verify
        report.still_running = verify(ctx, state, &key).await;
        report.enter(ShutdownState::Verified);
        state.shutdown = Some(report);
        Ok(())
    }
}

/// Hard power-off through the API; failure is only a warning
pub(crate) async fn force_off(ctx: &BuildContext, state: &mut BuildState, key: &VmKey) {
    tracing::info!(vm_key = %key, "Forcing VM power-off");
    if let Err(e) = ctx.gateway.power_action(key, PowerAction::Kill).await {
        state.warn(format!("forced power-off of VM {} failed: {}", key, e));
    }
}

/// Read the final power state; anything but "off" is a warning
pub(crate) async fn verify(ctx: &BuildContext, state: &mut BuildState, key: &VmKey) -> Option<bool> {
    match ctx.gateway.is_running(key).await {
        Ok(false) => {
            tracing::info!(vm_key = %key, "VM is powered off");
            Some(false)
        }
        Ok(true) => {
            state.warn(format!("VM {} still reports running after shutdown", key));
            Some(true)
        }
        Err(e) => {
            state.warn(format!("could not verify power state of VM {}: {}", key, e));
            None
        }
    }
}

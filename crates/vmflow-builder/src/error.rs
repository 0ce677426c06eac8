//! Build error types

use crate::executor::ExecError;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use vmflow_api::ApiError;

/// Fatal build errors
///
/// Warnings (rollback failure, inconclusive shutdown, failed forced
/// power-off) never become a `BuildError`; they end up in
/// [`BuildOutcome::warnings`](crate::runner::BuildOutcome).
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("VM was created but its numeric machine id could not be resolved")]
    MachineIdentifierMissing,

    #[error("failed to create {resource} '{name}': {cause}")]
    ResourceCreationFailed {
        resource: &'static str,
        name: String,
        #[source]
        cause: ApiError,
    },

    #[error("disk {disk_key} still importing after {waited:?} (last status: {last_status})")]
    DiskImportTimeout {
        disk_key: String,
        last_status: String,
        waited: Duration,
    },

    #[error("failed to reconcile size of disk '{disk_name}': {cause}")]
    DiskResizeFailed {
        disk_name: String,
        #[source]
        cause: ApiError,
    },

    #[error("power-on rejected: {cause}")]
    PowerOnFailed {
        #[source]
        cause: ApiError,
    },

    #[error("VM did not report running after {waited:?}")]
    PowerOnTimeout { waited: Duration },

    #[error(
        "no static address in a network-config cloud-init payload and guest agent is disabled; \
         enable the guest agent or configure a static IP"
    )]
    NoAddressDiscoveryMethod,

    #[error(
        "guest agent reported no IPv4 address after {waited:?}; check that the agent is \
         installed and running, that the network is configured, or whether the VM is still booting"
    )]
    GuestAgentTimeout {
        waited: Duration,
        addresses: Vec<Ipv4Addr>,
    },

    #[error("guest addresses did not settle within {waited:?} (last seen: {addresses:?})")]
    AddressSettleTimeout {
        waited: Duration,
        addresses: Vec<Ipv4Addr>,
    },

    #[error("lost connection to the guest agent while addresses were settling: {cause}")]
    AgentConnectionLost {
        #[source]
        cause: ApiError,
    },

    #[error("could not connect to {host}: {cause}")]
    Connect {
        host: String,
        #[source]
        cause: ExecError,
    },

    #[error("provision command '{command}' exited with status {exit_status}")]
    ProvisionCommandFailed { command: String, exit_status: i32 },

    #[error("executor error: {0}")]
    Executor(#[from] ExecError),

    #[error("build state is missing {0}")]
    MissingState(&'static str),

    #[error("build cancelled during {step}")]
    Cancelled { step: &'static str },
}

impl BuildError {
    /// Exceeded a step's wait budget
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            BuildError::DiskImportTimeout { .. }
                | BuildError::PowerOnTimeout { .. }
                | BuildError::GuestAgentTimeout { .. }
                | BuildError::AddressSettleTimeout { .. }
        )
    }

    /// Whether rerunning the whole build could plausibly succeed
    ///
    /// Precondition errors are never retryable; they fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        match self {
            BuildError::MachineIdentifierMissing
            | BuildError::NoAddressDiscoveryMethod
            | BuildError::MissingState(_)
            | BuildError::ProvisionCommandFailed { .. }
            | BuildError::Cancelled { .. } => false,
            BuildError::ResourceCreationFailed { cause, .. }
            | BuildError::DiskResizeFailed { cause, .. }
            | BuildError::PowerOnFailed { cause } => {
                !matches!(cause.status(), Some(status) if (400..500).contains(&status))
            }
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;

//! Per-build state threaded through the steps
//!
//! Each field is written by exactly one step and read by the ones after it.
//! "Not resolved yet" is `None`, never a sentinel value.

use crate::executor::RemoteSession;
use crate::steps::shutdown::ShutdownReport;
use serde::Serialize;
use std::fmt;
use vmflow_api::{DiskKey, DiskSpec, MachineId, VmKey};

/// Identity of the VM once the control plane has accepted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedVm {
    pub key: VmKey,
    pub machine_id: MachineId,
}

/// An import disk waiting for completion, with the spec it was created from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedImport {
    pub disk_key: DiskKey,
    pub spec: DiskSpec,
}

/// Disks created with `import` media, in creation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportTracker {
    pending: Vec<TrackedImport>,
}

impl ImportTracker {
    pub fn track(&mut self, disk_key: DiskKey, spec: DiskSpec) {
        self.pending.push(TrackedImport { disk_key, spec });
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn contains(&self, disk_key: &DiskKey) -> bool {
        self.pending.iter().any(|t| &t.disk_key == disk_key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackedImport> {
        self.pending.iter()
    }

    /// Hand the tracked disks to the waiter, leaving the tracker empty
    pub fn take(&mut self) -> Vec<TrackedImport> {
        std::mem::take(&mut self.pending)
    }
}

/// Where a discovered address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSource {
    /// Parsed from a `network-config` cloud-init payload
    StaticConfig,
    GuestAgent,
}

/// The host the build connects to, plus everything seen when it was chosen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredAddress {
    pub host: String,
    pub candidates: Vec<String>,
    pub source: AddressSource,
}

/// Mutable state of one build invocation
#[derive(Default)]
pub struct BuildState {
    /// Set as soon as creation succeeds, before the machine id is known
    pub vm_key: Option<VmKey>,
    pub machine_id: Option<MachineId>,
    pub imports: ImportTracker,
    pub address: Option<DiscoveredAddress>,
    /// Set by steps whose failure must delete the VM
    pub rollback_requested: bool,
    /// Open guest session, reused by the shutdown coordinator
    pub session: Option<Box<dyn RemoteSession>>,
    pub shutdown: Option<ShutdownReport>,
    pub warnings: Vec<String>,
}

impl BuildState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    /// Both halves of the VM identity, once resolved
    pub fn provisioned(&self) -> Option<ProvisionedVm> {
        Some(ProvisionedVm {
            key: self.vm_key.clone()?,
            machine_id: self.machine_id?,
        })
    }
}

impl fmt::Debug for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildState")
            .field("vm_key", &self.vm_key)
            .field("machine_id", &self.machine_id)
            .field("imports", &self.imports)
            .field("address", &self.address)
            .field("rollback_requested", &self.rollback_requested)
            .field("session", &self.session.as_ref().map(|_| "<open>"))
            .field("shutdown", &self.shutdown)
            .field("warnings", &self.warnings)
            .finish()
    }
}

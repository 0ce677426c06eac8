//! Gateway trait consumed by the lifecycle
//!
//! The lifecycle only talks to the control plane through [`Gateway`], so a
//! build can run against the real REST API ([`VergeGateway`]) or a test
//! double. Wire strings are converted to enums here and nowhere else.

use crate::client::{ApiClient, ClusterConnection};
use crate::drive::{DiskInfo, DriveApi, ImportStatus};
use crate::error::Result;
use crate::model::{DiskKey, DiskSpec, MachineId, NicKey, NicSpec, VmKey, VmSpec};
use crate::network::{NetworkApi, NetworkSummary};
use crate::nic::NicApi;
use crate::vm::{GuestInterface, VmApi, VmSummary};
use async_trait::async_trait;
use std::fmt;

/// Power actions the lifecycle submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowerAction {
    PowerOn,
    /// Hard power-off, bypassing the guest
    Kill,
}

impl PowerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PowerAction::PowerOn => "poweron",
            PowerAction::Kill => "kill",
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control-plane operations used by a build
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Create the VM; only the opaque key comes back
    async fn create_vm(&self, vm: &VmSpec) -> Result<VmKey>;

    /// Numeric machine id of a created VM, read back after creation
    async fn vm_machine_id(&self, key: &VmKey) -> Result<Option<MachineId>>;

    async fn delete_vm(&self, key: &VmKey) -> Result<()>;

    async fn create_disk(&self, machine: MachineId, disk: &DiskSpec) -> Result<DiskKey>;

    async fn read_disk(&self, key: &DiskKey) -> Result<DiskInfo>;

    async fn resize_disk(&self, key: &DiskKey, size_gb: u64) -> Result<()>;

    async fn disk_import_status(&self, key: &DiskKey) -> Result<ImportStatus>;

    async fn create_nic(&self, machine: MachineId, nic: &NicSpec) -> Result<NicKey>;

    async fn power_action(&self, key: &VmKey, action: PowerAction) -> Result<()>;

    async fn is_running(&self, key: &VmKey) -> Result<bool>;

    /// Malformed or absent agent data yields an empty list
    async fn guest_agent_networks(&self, key: &VmKey) -> Result<Vec<GuestInterface>>;
}

/// [`Gateway`] backed by the REST API
#[derive(Debug, Clone)]
pub struct VergeGateway {
    vms: VmApi,
    drives: DriveApi,
    nics: NicApi,
    networks: NetworkApi,
}

impl VergeGateway {
    pub fn new(conn: &ClusterConnection) -> Result<Self> {
        let client = ApiClient::new(conn)?;
        tracing::debug!("Control plane at {}", client.base_url());
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: ApiClient) -> Self {
        Self {
            vms: VmApi::new(client.clone()),
            drives: DriveApi::new(client.clone()),
            nics: NicApi::new(client.clone()),
            networks: NetworkApi::new(client),
        }
    }

    pub async fn list_vms(&self, name: Option<&str>, include_snapshots: bool) -> Result<Vec<VmSummary>> {
        self.vms.list(name, include_snapshots).await
    }

    pub async fn list_networks(
        &self,
        name: Option<&str>,
        kind: Option<&str>,
    ) -> Result<Vec<NetworkSummary>> {
        self.networks.list(name, kind).await
    }
}

#[async_trait]
impl Gateway for VergeGateway {
    async fn create_vm(&self, vm: &VmSpec) -> Result<VmKey> {
        self.vms.create(vm).await
    }

    async fn vm_machine_id(&self, key: &VmKey) -> Result<Option<MachineId>> {
        self.vms.machine_id(key).await
    }

    async fn delete_vm(&self, key: &VmKey) -> Result<()> {
        self.vms.delete(key).await
    }

    async fn create_disk(&self, machine: MachineId, disk: &DiskSpec) -> Result<DiskKey> {
        self.drives.create(machine, disk).await
    }

    async fn read_disk(&self, key: &DiskKey) -> Result<DiskInfo> {
        self.drives.read(key).await
    }

    async fn resize_disk(&self, key: &DiskKey, size_gb: u64) -> Result<()> {
        self.drives.resize(key, size_gb).await
    }

    async fn disk_import_status(&self, key: &DiskKey) -> Result<ImportStatus> {
        self.drives.import_status(key).await
    }

    async fn create_nic(&self, machine: MachineId, nic: &NicSpec) -> Result<NicKey> {
        self.nics.create(machine, nic).await
    }

    async fn power_action(&self, key: &VmKey, action: PowerAction) -> Result<()> {
        self.vms.action(key, action.as_str()).await
    }

    async fn is_running(&self, key: &VmKey) -> Result<bool> {
        self.vms.is_running(key).await
    }

    async fn guest_agent_networks(&self, key: &VmKey) -> Result<Vec<GuestInterface>> {
        self.vms.guest_agent_networks(key).await
    }
}

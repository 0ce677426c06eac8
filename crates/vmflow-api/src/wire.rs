//! Request/response bodies exchanged with the REST API

use crate::error::ApiError;
use crate::model::{CloudInitFile, DiskSpec, MachineId, NicSpec, VmSpec, gb_to_bytes};
use serde::{Deserialize, Deserializer, Serialize};

/// `{"$key": ..., "response": ...}` returned by creation calls
#[derive(Debug, Deserialize)]
pub(crate) struct CreatedResponse {
    #[serde(rename = "$key", deserialize_with = "string_or_number")]
    pub key: String,
}

/// Keys are documented as strings but some endpoints answer with numbers
pub(crate) fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

fn opt_u64_lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
        Null,
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Num(n)) => Some(n),
        Some(Raw::Str(s)) => s.parse().ok(),
        Some(Raw::Null) | None => None,
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct CloudInitFileBody<'a> {
    name: &'a str,
    contents: &'a str,
}

impl<'a> From<&'a CloudInitFile> for CloudInitFileBody<'a> {
    fn from(file: &'a CloudInitFile) -> Self {
        Self {
            name: &file.name,
            contents: &file.contents,
        }
    }
}

/// POST body for `/vms`
#[derive(Debug, Serialize)]
pub(crate) struct VmCreateBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_type: Option<&'a str>,
    allow_hotplug: bool,
    disable_powercycle: bool,
    #[serde(skip_serializing_if = "is_zero")]
    cpu_cores: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpu_type: Option<&'a str>,
    #[serde(skip_serializing_if = "is_zero")]
    ram: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    console: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    display: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    video: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sound: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    os_family: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    os_description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rtc_base: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_order: Option<&'a str>,
    console_pass_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    console_pass: Option<&'a str>,
    usb_tablet: bool,
    uefi: bool,
    secure_boot: bool,
    serial_port: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    boot_delay: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferred_node: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    snapshot_profile: Option<&'a str>,
    #[serde(rename = "cloudinit_datasource", skip_serializing_if = "Option::is_none")]
    cloud_init_datasource: Option<&'a str>,
    #[serde(rename = "cloudinit_files", skip_serializing_if = "Vec::is_empty")]
    cloud_init_files: Vec<CloudInitFileBody<'a>>,
    guest_agent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    ha_group: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    advanced: Option<&'a str>,
    nested_virtualization: bool,
    disable_hypervisor: bool,
}

fn is_zero(v: &u32) -> bool {
    *v == 0
}

impl<'a> From<&'a VmSpec> for VmCreateBody<'a> {
    fn from(vm: &'a VmSpec) -> Self {
        Self {
            name: &vm.name,
            cluster: vm.cluster.as_deref(),
            description: vm.description.as_deref(),
            enabled: vm.enabled,
            machine_type: vm.machine_type.as_deref(),
            allow_hotplug: vm.allow_hotplug,
            disable_powercycle: vm.disable_powercycle,
            cpu_cores: vm.cpu_cores,
            cpu_type: vm.cpu_type.as_deref(),
            ram: vm.ram,
            console: vm.console.as_deref(),
            display: vm.display.as_deref(),
            video: vm.video.as_deref(),
            sound: vm.sound.as_deref(),
            os_family: vm.os_family.as_deref(),
            os_description: vm.os_description.as_deref(),
            rtc_base: vm.rtc_base.as_deref(),
            boot_order: vm.boot_order.as_deref(),
            console_pass_enabled: vm.console_pass_enabled,
            console_pass: vm.console_pass.as_deref(),
            usb_tablet: vm.usb_tablet,
            uefi: vm.uefi,
            secure_boot: vm.secure_boot,
            serial_port: vm.serial_port,
            boot_delay: vm.boot_delay,
            preferred_node: vm.preferred_node.as_deref(),
            snapshot_profile: vm.snapshot_profile.as_deref(),
            cloud_init_datasource: vm.cloud_init_datasource.as_deref(),
            cloud_init_files: vm.cloud_init_files.iter().map(Into::into).collect(),
            guest_agent: vm.guest_agent,
            ha_group: vm.ha_group.as_deref(),
            advanced: vm.advanced.as_deref(),
            nested_virtualization: vm.nested_virtualization,
            disable_hypervisor: vm.disable_hypervisor,
        }
    }
}

/// Subset of a VM record read back after creation
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct VmRecord {
    #[serde(default, deserialize_with = "opt_u64_lenient")]
    pub machine: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

impl VmRecord {
    pub fn machine_id(&self) -> Option<MachineId> {
        self.machine.filter(|m| *m != 0).map(MachineId)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PowerStateBody {
    #[serde(default)]
    pub powerstate: Option<bool>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VmActionBody<'a> {
    pub vm: &'a str,
    pub action: &'a str,
}

/// POST body for `/machine_drives`
#[derive(Debug, Serialize)]
pub(crate) struct DiskCreateBody<'a> {
    machine: u64,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interface: Option<&'a str>,
    media: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_source: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    preferred_tier: Option<&'a str>,
    /// Bytes on the wire
    #[serde(rename = "disksize", skip_serializing_if = "Option::is_none")]
    disk_size: Option<u64>,
    enabled: bool,
    readonly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    serial: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    asset: Option<&'a str>,
    #[serde(rename = "orderid", skip_serializing_if = "Option::is_none")]
    order_id: Option<u32>,
    preserve_drive_format: bool,
}

impl<'a> DiskCreateBody<'a> {
    pub fn new(machine: MachineId, disk: &'a DiskSpec) -> Result<Self, ApiError> {
        let disk_size = disk
            .size_gb
            .map(|gb| gb_to_bytes(gb).ok_or(ApiError::SizeOutOfRange { size_gb: gb }))
            .transpose()?;
        Ok(Self {
            machine: machine.0,
            name: &disk.name,
            description: disk.description.as_deref(),
            interface: disk.interface.as_deref(),
            media: disk.media.as_str(),
            media_source: disk.media_source,
            preferred_tier: disk.preferred_tier.as_deref(),
            disk_size,
            enabled: disk.enabled,
            readonly: disk.read_only,
            serial: disk.serial.as_deref(),
            asset: disk.asset.as_deref(),
            order_id: disk.order_id,
            preserve_drive_format: disk.preserve_drive_format,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiskRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "disksize", deserialize_with = "opt_u64_lenient")]
    pub disk_size: Option<u64>,
    #[serde(default)]
    pub media: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DiskStatusBody {
    #[serde(default, alias = "powerState", alias = "status")]
    pub powerstate: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct DiskResizeBody {
    pub disksize: u64,
}

/// POST body for `/machine_nics`
#[derive(Debug, Serialize)]
pub(crate) struct NicCreateBody<'a> {
    machine: u64,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    interface: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    driver: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    vnet: Option<u64>,
    #[serde(rename = "macaddress", skip_serializing_if = "Option::is_none")]
    mac: Option<&'a str>,
    #[serde(rename = "ipaddress", skip_serializing_if = "Option::is_none")]
    ip_address: Option<&'a str>,
    assign_ipaddress: bool,
    enabled: bool,
}

impl<'a> NicCreateBody<'a> {
    pub fn new(machine: MachineId, nic: &'a NicSpec) -> Self {
        Self {
            machine: machine.0,
            name: &nic.name,
            description: nic.description.as_deref(),
            interface: nic.interface.as_deref(),
            driver: nic.driver.as_deref(),
            model: nic.model.as_deref(),
            vnet: nic.vnet,
            mac: nic.mac.as_deref(),
            ip_address: nic.ip_address.as_deref(),
            assign_ipaddress: nic.assign_ip_address,
            enabled: nic.enabled,
        }
    }
}

/// `dashboard` view of a VM, only the guest-agent part
#[derive(Debug, Default, Deserialize)]
pub(crate) struct GuestAgentBody {
    #[serde(default)]
    pub machine: Option<GuestAgentMachine>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GuestAgentMachine {
    #[serde(default)]
    pub status: Option<GuestAgentStatus>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GuestAgentStatus {
    #[serde(default)]
    pub agent_guest_info: Option<AgentGuestInfo>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AgentGuestInfo {
    #[serde(default)]
    pub network: Vec<AgentNetwork>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AgentNetwork {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "ip-addresses")]
    pub ip_addresses: Vec<AgentIpAddress>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AgentIpAddress {
    #[serde(default, rename = "ip-address-type")]
    pub address_type: String,
    #[serde(default, rename = "ip-address")]
    pub address: String,
}

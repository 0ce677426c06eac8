//! Domain model for a VM build
//!
//! These types describe the desired machine. They are supplied once at build
//! start and never mutated by the lifecycle; the per-resource APIs copy what
//! they need into their own request bodies.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

macro_rules! string_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_key!(
    /// Opaque external key of a VM, used for power/status/delete calls
    VmKey
);
string_key!(
    /// Key of a machine drive
    DiskKey
);
string_key!(
    /// Key of a machine NIC
    NicKey
);

/// Numeric internal machine identifier; disks and NICs bind to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub u64);

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The API sizes drives in bytes; configuration uses GB
pub const BYTES_PER_GB: u64 = 1024 * 1024 * 1024;

/// GB to bytes, `None` when the result does not fit a `u64`
pub fn gb_to_bytes(gb: u64) -> Option<u64> {
    gb.checked_mul(BYTES_PER_GB)
}

/// Disk provisioning strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaMode {
    /// Blank disk
    #[default]
    Disk,
    /// Import from an external source (file or image)
    Import,
    /// Clone an existing disk
    Clone,
    /// Virtual CD-ROM
    Cdrom,
    /// EFI variable store
    EfiDisk,
    /// Discarded on power-off
    NonPersistent,
}

impl MediaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaMode::Disk => "disk",
            MediaMode::Import => "import",
            MediaMode::Clone => "clone",
            MediaMode::Cdrom => "cdrom",
            MediaMode::EfiDisk => "efidisk",
            MediaMode::NonPersistent => "nonpersistent",
        }
    }

    /// Parse a wire/config value (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "disk" => Some(Self::Disk),
            "import" => Some(Self::Import),
            "clone" => Some(Self::Clone),
            "cdrom" => Some(Self::Cdrom),
            "efidisk" => Some(Self::EfiDisk),
            "nonpersistent" => Some(Self::NonPersistent),
            _ => None,
        }
    }
}

impl fmt::Display for MediaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named cloud-init payload attached to the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloudInitFile {
    pub name: String,
    pub contents: String,
}

impl CloudInitFile {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }
}

/// Desired VM attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmSpec {
    pub name: String,
    pub cluster: Option<String>,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub machine_type: Option<String>,
    pub allow_hotplug: bool,
    pub disable_powercycle: bool,
    pub cpu_cores: u32,
    pub cpu_type: Option<String>,
    /// RAM in MB
    pub ram: u32,
    pub console: Option<String>,
    pub display: Option<String>,
    pub video: Option<String>,
    pub sound: Option<String>,
    pub os_family: Option<String>,
    pub os_description: Option<String>,
    pub rtc_base: Option<String>,
    pub boot_order: Option<String>,
    pub console_pass_enabled: bool,
    pub console_pass: Option<String>,
    pub usb_tablet: bool,
    pub uefi: bool,
    pub secure_boot: bool,
    pub serial_port: bool,
    pub boot_delay: Option<u32>,
    pub preferred_node: Option<String>,
    pub snapshot_profile: Option<String>,
    pub cloud_init_datasource: Option<String>,
    /// Guest-agent based address discovery is allowed
    pub guest_agent: bool,
    pub ha_group: Option<String>,
    pub advanced: Option<String>,
    pub nested_virtualization: bool,
    pub disable_hypervisor: bool,
    /// Disks, created in this order
    pub disks: Vec<DiskSpec>,
    /// NICs, created in this order
    pub nics: Vec<NicSpec>,
    #[serde(skip_deserializing)]
    pub cloud_init_files: Vec<CloudInitFile>,
}

impl VmSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            ..Self::default()
        }
    }

    /// Cloud-init payloads with the given name, in configured order
    pub fn cloud_init_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CloudInitFile> {
        self.cloud_init_files.iter().filter(move |f| f.name == name)
    }
}

/// One disk of the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default, deserialize_with = "media_mode")]
    pub media: MediaMode,
    /// Source file/disk reference for `import` and `clone`
    #[serde(default)]
    pub media_source: Option<u64>,
    #[serde(default)]
    pub preferred_tier: Option<String>,
    /// Requested size in GB
    #[serde(default, alias = "disksize")]
    pub size_gb: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "readonly")]
    pub read_only: bool,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    #[serde(default, alias = "orderid")]
    pub order_id: Option<u32>,
    #[serde(default)]
    pub preserve_drive_format: bool,
}

impl DiskSpec {
    pub fn new(name: impl Into<String>, media: MediaMode) -> Self {
        Self {
            name: name.into(),
            description: None,
            interface: None,
            media,
            media_source: None,
            preferred_tier: None,
            size_gb: None,
            enabled: true,
            read_only: false,
            serial: None,
            asset: None,
            order_id: None,
            preserve_drive_format: false,
        }
    }

    pub fn with_size_gb(mut self, size_gb: u64) -> Self {
        self.size_gb = Some(size_gb);
        self
    }

    pub fn with_source(mut self, source: u64) -> Self {
        self.media_source = Some(source);
        self
    }

    pub fn with_interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// Disks created from an import source must be waited on before power-on
    pub fn is_import(&self) -> bool {
        self.media == MediaMode::Import
    }
}

/// One network interface of the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub interface: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Target virtual network
    #[serde(default)]
    pub vnet: Option<u64>,
    #[serde(default, alias = "macaddress")]
    pub mac: Option<String>,
    #[serde(default, alias = "ipaddress")]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub assign_ip_address: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl NicSpec {
    pub fn new(name: impl Into<String>, vnet: u64) -> Self {
        Self {
            name: name.into(),
            description: None,
            interface: None,
            driver: None,
            model: None,
            vnet: Some(vnet),
            mac: None,
            ip_address: None,
            assign_ip_address: false,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn media_mode<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MediaMode, D::Error> {
    let raw = String::deserialize(deserializer)?;
    MediaMode::parse(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unknown media mode '{}'", raw)))
}

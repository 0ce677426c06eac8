//! Build file schema

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vmflow_api::VmSpec;

/// Top level of `vmflow.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildFile {
    #[serde(default)]
    pub cluster: ClusterSection,
    #[serde(default)]
    pub vm: VmSection,
    #[serde(default)]
    pub communicator: CommunicatorConfig,
    /// Commands run in the guest, in order
    #[serde(default)]
    pub provision: Vec<String>,
    #[serde(default)]
    pub shutdown_command: Option<String>,
    #[serde(default = "default_power_on_timeout")]
    pub power_on_timeout_secs: u64,
    #[serde(default = "default_ip_wait_timeout")]
    pub ip_wait_timeout_secs: u64,
    #[serde(default = "default_ip_settle_timeout")]
    pub ip_settle_timeout_secs: u64,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_power_on_timeout() -> u64 {
    120
}

fn default_ip_wait_timeout() -> u64 {
    600
}

fn default_ip_settle_timeout() -> u64 {
    30
}

fn default_shutdown_timeout() -> u64 {
    300
}

/// Control-plane connection; credentials may come from the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterSection {
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

/// VM attributes plus cloud-init entries that still need resolving
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmSection {
    #[serde(flatten)]
    pub spec: VmSpec,
    #[serde(default)]
    pub cloud_init_files: Vec<CloudInitEntry>,
}

/// A cloud-init payload given inline or as a list of files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudInitEntry {
    pub name: String,
    #[serde(default)]
    pub contents: Option<String>,
    /// Read relative to the build file and joined with newlines
    #[serde(default)]
    pub files: Option<Vec<PathBuf>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommunicatorKind {
    Ssh,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicatorConfig {
    #[serde(default, rename = "type")]
    pub kind: Option<CommunicatorKind>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub private_key_file: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Extra `-o` options passed to ssh
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    1200
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            kind: None,
            username: None,
            port: default_ssh_port(),
            private_key_file: None,
            connect_timeout_secs: default_connect_timeout(),
            options: Vec::new(),
        }
    }
}

impl CommunicatorConfig {
    /// Explicit `type`, else ssh when a username is given
    pub fn kind(&self) -> CommunicatorKind {
        match self.kind {
            Some(kind) => kind,
            None if self.username.is_some() => CommunicatorKind::Ssh,
            None => CommunicatorKind::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_yaml() {
        let file: BuildFile = serde_yaml::from_str("vm:\n  name: web\n").unwrap();
        assert_eq!(file.vm.spec.name, "web");
        assert!(file.vm.spec.enabled);
        assert_eq!(file.power_on_timeout_secs, 120);
        assert_eq!(file.ip_wait_timeout_secs, 600);
        assert_eq!(file.ip_settle_timeout_secs, 30);
        assert_eq!(file.shutdown_timeout_secs, 300);
        assert_eq!(file.communicator.kind(), CommunicatorKind::None);
        assert_eq!(file.communicator.port, 22);
    }

    #[test]
    fn test_vm_section_flattens_spec() {
        let yaml = r##"
vm:
  name: web
  cpu_cores: 4
  ram: 8192
  guest_agent: true
  disks:
    - name: root
      media: import
      media_source: 12
      disksize: 40
  nics:
    - name: lan0
      vnet: 3
  cloud_init_files:
    - name: user-data
      contents: "#cloud-config"
"##;
        let file: BuildFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.vm.spec.cpu_cores, 4);
        assert_eq!(file.vm.spec.ram, 8192);
        assert!(file.vm.spec.guest_agent);
        assert_eq!(file.vm.spec.disks[0].size_gb, Some(40));
        assert_eq!(file.vm.spec.nics[0].vnet, Some(3));
        assert_eq!(file.vm.cloud_init_files.len(), 1);
        assert!(file.vm.spec.cloud_init_files.is_empty());
    }

    #[test]
    fn test_communicator_kind_inferred_from_username() {
        let file: BuildFile =
            serde_yaml::from_str("communicator:\n  username: ubuntu\n").unwrap();
        assert_eq!(file.communicator.kind(), CommunicatorKind::Ssh);

        let file: BuildFile =
            serde_yaml::from_str("communicator:\n  type: none\n  username: ubuntu\n").unwrap();
        assert_eq!(file.communicator.kind(), CommunicatorKind::None);
    }
}

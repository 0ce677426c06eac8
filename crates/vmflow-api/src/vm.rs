//! VM endpoints: create, read, delete, power actions, guest agent

use crate::client::{ApiClient, QueryOptions, decode, expect_status};
use crate::error::{ApiError, Result};
use crate::model::{MachineId, VmKey, VmSpec};
use crate::wire::{
    CreatedResponse, GuestAgentBody, PowerStateBody, VmActionBody, VmCreateBody, VmRecord,
    string_or_number,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

const VMS: &str = "vms";
const VM_ACTIONS: &str = "vm_actions";

/// Addresses the guest agent reports for one interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestInterface {
    pub name: String,
    pub ipv4: Vec<Ipv4Addr>,
}

/// Summary row of `list_vms`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmSummary {
    #[serde(rename = "$key", deserialize_with = "string_or_number")]
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_snapshot: bool,
    #[serde(default)]
    pub cpu_cores: Option<u32>,
    #[serde(default)]
    pub ram: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct VmApi {
    client: ApiClient,
}

impl VmApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Create the VM record; 201 is the only accepted answer
    pub async fn create(&self, vm: &VmSpec) -> Result<VmKey> {
        tracing::info!("Creating VM: {}", vm.name);
        let response = self.client.post(VMS, &VmCreateBody::from(vm)).await?;
        expect_status(&response, &[StatusCode::CREATED], VMS)?;

        let created: CreatedResponse = decode(response, VMS).await?;
        if created.key.is_empty() {
            return Err(ApiError::invalid_response(VMS, "empty $key"));
        }
        Ok(VmKey::new(created.key))
    }

    /// Numeric machine id of an existing VM, if the record carries one
    pub async fn machine_id(&self, key: &VmKey) -> Result<Option<MachineId>> {
        let path = format!("{}/{}", VMS, key);
        let response = self
            .client
            .get(&path, &QueryOptions::fields("machine,name"))
            .await?;
        let record: VmRecord = decode(response, &path).await?;
        tracing::debug!("VM {} ({:?}) has machine {:?}", key, record.name, record.machine);
        Ok(record.machine_id())
    }

    pub async fn delete(&self, key: &VmKey) -> Result<()> {
        tracing::info!("Deleting VM: {}", key);
        let path = format!("{}/{}", VMS, key);
        let response = self.client.delete(&path).await?;
        expect_status(&response, &[StatusCode::OK, StatusCode::NO_CONTENT], &path)
    }

    /// Submit a named power action (`poweron`, `kill`, ...)
    pub async fn action(&self, key: &VmKey, action: &str) -> Result<()> {
        tracing::debug!("VM action {} on {}", action, key);
        let body = VmActionBody {
            vm: key.as_str(),
            action,
        };
        let response = self.client.post(VM_ACTIONS, &body).await?;
        expect_status(&response, &[StatusCode::CREATED], VM_ACTIONS)
    }

    /// Whether the VM currently runs; a missing flag reads as not running
    pub async fn is_running(&self, key: &VmKey) -> Result<bool> {
        let path = format!("{}/{}", VMS, key);
        let response = self
            .client
            .get(&path, &QueryOptions::fields("machine#status#running as powerstate"))
            .await?;
        let state: PowerStateBody = decode(response, &path).await?;
        Ok(state.powerstate.unwrap_or(false))
    }

    /// IPv4 addresses reported by the guest agent, per interface
    ///
    /// Loopback addresses are dropped. A payload that does not carry agent
    /// data (agent not yet running) yields an empty list.
    pub async fn guest_agent_networks(&self, key: &VmKey) -> Result<Vec<GuestInterface>> {
        let path = format!("{}/{}", VMS, key);
        let response = self
            .client
            .get(&path, &QueryOptions::fields("dashboard"))
            .await?;
        let body = response.text().await?;
        Ok(parse_guest_agent(&body))
    }

    pub async fn list(&self, name: Option<&str>, include_snapshots: bool) -> Result<Vec<VmSummary>> {
        let mut filters = Vec::new();
        if let Some(name) = name {
            filters.push(format!("name eq '{}'", name));
        }
        if !include_snapshots {
            filters.push("is_snapshot eq false".to_string());
        }

        let mut opts = QueryOptions::fields("$key,name,description,is_snapshot,cpu_cores,ram");
        if !filters.is_empty() {
            opts = opts.with_filter(filters.join(" and "));
        }
        let response = self.client.get(VMS, &opts).await?;
        decode(response, VMS).await
    }
}

pub(crate) fn parse_guest_agent(body: &str) -> Vec<GuestInterface> {
    let parsed: GuestAgentBody = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Guest agent payload not usable yet: {}", e);
            return Vec::new();
        }
    };

    let networks = parsed
        .machine
        .and_then(|m| m.status)
        .and_then(|s| s.agent_guest_info)
        .map(|info| info.network)
        .unwrap_or_default();

    networks
        .into_iter()
        .filter_map(|net| {
            let ipv4: Vec<Ipv4Addr> = net
                .ip_addresses
                .iter()
                .filter(|a| a.address_type.eq_ignore_ascii_case("ipv4"))
                .filter_map(|a| a.address.parse::<Ipv4Addr>().ok())
                .filter(|ip| !ip.is_loopback())
                .collect();
            if ipv4.is_empty() {
                None
            } else {
                Some(GuestInterface {
                    name: net.name,
                    ipv4,
                })
            }
        })
        .collect()
}

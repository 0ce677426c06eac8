//! Build artifact handed to the caller

use crate::error::{BuildError, Result};
use crate::state::{BuildState, DiscoveredAddress};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use vmflow_api::{MachineId, VmKey, VmSpec};

#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub vm_key: VmKey,
    pub machine_id: MachineId,
    pub name: String,
    pub address: Option<DiscoveredAddress>,
    pub created_at: DateTime<Utc>,
    /// Opaque metadata for downstream packaging
    pub generated_data: BTreeMap<String, Value>,
}

impl Artifact {
    pub fn assemble(spec: &VmSpec, state: &BuildState) -> Result<Self> {
        let vm = state
            .provisioned()
            .ok_or(BuildError::MissingState("provisioned vm"))?;

        let mut generated_data = BTreeMap::new();
        generated_data.insert("vm_name".to_string(), Value::from(spec.name.clone()));
        generated_data.insert(
            "os_family".to_string(),
            spec.os_family.clone().map(Value::from).unwrap_or(Value::Null),
        );
        generated_data.insert("cpu_cores".to_string(), Value::from(spec.cpu_cores));
        generated_data.insert("ram".to_string(), Value::from(spec.ram));

        Ok(Self {
            vm_key: vm.key,
            machine_id: vm.machine_id,
            name: spec.name.clone(),
            address: state.address.clone(),
            created_at: Utc::now(),
            generated_data,
        })
    }

    /// Address the build connected to, if any
    pub fn host(&self) -> Option<&str> {
        self.address.as_ref().map(|a| a.host.as_str())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

//! VM, disk and NIC creation

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::BuildState;
use crate::step::Step;
use async_trait::async_trait;

/// Creates the VM and then its disks and NICs, in configured order
///
/// Any failure after the VM exists requests rollback. Rollback deletes the
/// VM only; its disks and NICs go with it.
#[derive(Debug, Default)]
pub struct ResourceProvisioner;

impl ResourceProvisioner {
    pub const NAME: &'static str = "provision-resources";
}

#[async_trait]
impl Step for ResourceProvisioner {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        let spec = &ctx.spec;

        let key = ctx.gateway.create_vm(spec).await.map_err(|cause| {
            BuildError::ResourceCreationFailed {
                resource: "vm",
                name: spec.name.clone(),
                cause,
            }
        })?;
        tracing::info!(vm_key = %key, "Created VM {}", spec.name);
        state.vm_key = Some(key.clone());

        let machine_id = match ctx.gateway.vm_machine_id(&key).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                state.rollback_requested = true;
                return Err(BuildError::MachineIdentifierMissing);
            }
            Err(cause) => {
                state.rollback_requested = true;
                return Err(BuildError::ResourceCreationFailed {
                    resource: "vm",
                    name: spec.name.clone(),
                    cause,
                });
            }
        };
        state.machine_id = Some(machine_id);

        for disk in &spec.disks {
            let disk_key = match ctx.gateway.create_disk(machine_id, disk).await {
                Ok(disk_key) => disk_key,
                Err(cause) => {
                    state.rollback_requested = true;
                    return Err(BuildError::ResourceCreationFailed {
                        resource: "disk",
                        name: disk.name.clone(),
                        cause,
                    });
                }
            };
            tracing::debug!(disk_key = %disk_key, "Created disk {} ({})", disk.name, disk.media);
            if disk.is_import() {
                state.imports.track(disk_key, disk.clone());
            }
        }

        for nic in &spec.nics {
            match ctx.gateway.create_nic(machine_id, nic).await {
                Ok(nic_key) => tracing::debug!(nic_key = %nic_key, "Created NIC {}", nic.name),
                Err(cause) => {
                    state.rollback_requested = true;
                    return Err(BuildError::ResourceCreationFailed {
                        resource: "nic",
                        name: nic.name.clone(),
                        cause,
                    });
                }
            }
        }

        tracing::info!(
            machine_id = %machine_id,
            disks = spec.disks.len(),
            nics = spec.nics.len(),
            imports = state.imports.len(),
            "VM resources provisioned"
        );
        Ok(())
    }

    async fn rollback(&self, ctx: &BuildContext, state: &mut BuildState) {
        if !state.rollback_requested {
            return;
        }
        let Some(key) = state.vm_key.clone() else {
            return;
        };
        // One delete per build, whatever number of steps asked for it
        state.rollback_requested = false;

        tracing::info!(vm_key = %key, "Rolling back: deleting VM");
        if let Err(e) = ctx.gateway.delete_vm(&key).await {
            tracing::error!(vm_key = %key, "VM deletion failed: {}", e);
            state.warn(format!(
                "failed to delete VM {} during rollback, remove it manually: {}",
                key, e
            ));
        }
    }
}

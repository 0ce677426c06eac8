//! Power-on and static address extraction

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::{AddressSource, BuildState, DiscoveredAddress};
use crate::step::Step;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tokio::time::Instant;
use vmflow_api::{PowerAction, VmSpec};

/// Cloud-init payload that may carry a static address
pub const NETWORK_CONFIG: &str = "network-config";

static CIDR_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|\s+)(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})/\d{1,2}")
        .expect("static address pattern is valid")
});

/// Powers the VM on and waits until it reports running
///
/// A static address found in the `network-config` payload becomes the build's
/// address right away. Otherwise the guest agent must be enabled so the
/// resolver can find one.
#[derive(Debug, Default)]
pub struct PowerController;

impl PowerController {
    pub const NAME: &'static str = "power-on";
}

#[async_trait]
impl Step for PowerController {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        let key = state
            .vm_key
            .clone()
            .ok_or(BuildError::MissingState("vm key"))?;
        let settings = &ctx.settings;

        tracing::info!(vm_key = %key, "Powering on VM");
        if let Err(cause) = ctx.gateway.power_action(&key, PowerAction::PowerOn).await {
            state.rollback_requested = true;
            return Err(BuildError::PowerOnFailed { cause });
        }

        let started = Instant::now();
        loop {
            match ctx.gateway.is_running(&key).await {
                Ok(true) => break,
                Ok(false) => tracing::debug!(vm_key = %key, "VM not running yet"),
                Err(e) => tracing::debug!(vm_key = %key, "Running state read failed: {}", e),
            }

            let elapsed = started.elapsed();
            if elapsed >= settings.power_on_timeout {
                state.rollback_requested = true;
                return Err(BuildError::PowerOnTimeout { waited: elapsed });
            }
            let remaining = settings.power_on_timeout - elapsed;
            ctx.sleep(settings.power_poll_interval.min(remaining), Self::NAME)
                .await?;
        }
        tracing::info!(vm_key = %key, elapsed_secs = started.elapsed().as_secs(), "VM is running");

        if let Some(address) = static_address(&ctx.spec) {
            tracing::info!("Using static address {} from {}", address.host, NETWORK_CONFIG);
            state.address = Some(address);
            return Ok(());
        }

        if !ctx.spec.guest_agent {
            return Err(BuildError::NoAddressDiscoveryMethod);
        }
        tracing::debug!("No static address; deferring to guest agent");
        Ok(())
    }
}

/// Address configured in the first `network-config` payload that carries one
pub fn static_address(spec: &VmSpec) -> Option<DiscoveredAddress> {
    spec.cloud_init_named(NETWORK_CONFIG).find_map(|payload| {
        let candidates: Vec<String> = CIDR_ADDRESS
            .captures_iter(&payload.contents)
            .map(|c| c[1].to_string())
            .collect();

        Some(DiscoveredAddress {
            host: candidates.first()?.clone(),
            candidates,
            source: AddressSource::StaticConfig,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmflow_api::CloudInitFile;

    fn spec_with(files: Vec<CloudInitFile>) -> VmSpec {
        let mut spec = VmSpec::new("web");
        spec.cloud_init_files = files;
        spec
    }

    #[test]
    fn test_static_address_from_netplan() {
        let spec = spec_with(vec![CloudInitFile::new(
            NETWORK_CONFIG,
            "version: 2\nethernets:\n  eth0:\n    addresses:\n      - 10.10.0.5/24\n    gateway4: 10.10.0.1\n",
        )]);

        let address = static_address(&spec).unwrap();
        assert_eq!(address.host, "10.10.0.5");
        assert_eq!(address.candidates, vec!["10.10.0.5"]);
        assert_eq!(address.source, AddressSource::StaticConfig);
    }

    #[test]
    fn test_static_address_requires_cidr() {
        let spec = spec_with(vec![CloudInitFile::new(
            NETWORK_CONFIG,
            "version: 2\nethernets:\n  eth0:\n    dhcp4: true\n    gateway4: 10.10.0.1\n",
        )]);
        assert!(static_address(&spec).is_none());
    }

    #[test]
    fn test_static_address_ignores_other_payloads() {
        let spec = spec_with(vec![CloudInitFile::new(
            "user-data",
            "runcmd:\n  - ip addr add 10.0.0.9/24 dev eth0\n",
        )]);
        assert!(static_address(&spec).is_none());
    }

    #[test]
    fn test_static_address_uses_first_network_config() {
        let spec = spec_with(vec![
            CloudInitFile::new(NETWORK_CONFIG, "addresses: [ 192.168.5.10/24 ]"),
            CloudInitFile::new(NETWORK_CONFIG, "addresses:\n  - 172.16.0.2/16\n"),
        ]);
        assert_eq!(static_address(&spec).unwrap().host, "192.168.5.10");
    }

    #[test]
    fn test_static_address_skips_payload_without_address() {
        let spec = spec_with(vec![
            CloudInitFile::new(NETWORK_CONFIG, "ethernets:\n  eth0:\n    dhcp4: true\n"),
            CloudInitFile::new(NETWORK_CONFIG, "addresses:\n  - 172.16.0.2/16\n"),
        ]);
        let address = static_address(&spec).unwrap();
        assert_eq!(address.host, "172.16.0.2");
        assert_eq!(address.candidates, vec!["172.16.0.2"]);
    }
}

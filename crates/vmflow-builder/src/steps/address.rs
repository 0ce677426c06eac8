//! Guest-agent address discovery
//!
//! Two phases. Discovery polls the guest agent until it reports at least one
//! IPv4 address. Settling then re-polls on a shorter interval and only
//! accepts a set once it has stayed the same for the whole settle window;
//! any change restarts the window with the new set. Only discovery counts
//! against the wait timeout; settling has its own budget of a few windows.

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::state::{AddressSource, BuildState, DiscoveredAddress};
use crate::step::Step;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use tokio::time::Instant;
use vmflow_api::{GuestInterface, VmKey};

/// Resolves the build address from the guest agent when no static one exists
#[derive(Debug, Default)]
pub struct AddressResolver;

impl AddressResolver {
    pub const NAME: &'static str = "resolve-address";
}

#[async_trait]
impl Step for AddressResolver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, ctx: &BuildContext, state: &mut BuildState) -> Result<()> {
        if let Some(address) = &state.address {
            tracing::debug!("Address already resolved ({:?}), skipping guest agent", address.source);
            return Ok(());
        }
        let key = state
            .vm_key
            .clone()
            .ok_or(BuildError::MissingState("vm key"))?;

        let first = discover(ctx, &key).await?;
        tracing::info!(vm_key = %key, "Guest agent reported {:?}, waiting for it to settle", first);
        let stable = settle(ctx, &key, first).await?;

        let host = select_host(&stable);
        tracing::info!(vm_key = %key, "Resolved address {}", host);
        state.address = Some(DiscoveredAddress {
            host: host.to_string(),
            candidates: stable.iter().map(ToString::to_string).collect(),
            source: AddressSource::GuestAgent,
        });
        Ok(())
    }
}

/// Flatten per-interface addresses, keeping the agent's order
pub fn flatten_addresses(interfaces: &[GuestInterface]) -> Vec<Ipv4Addr> {
    interfaces
        .iter()
        .flat_map(|iface| iface.ipv4.iter().copied())
        .filter(|ip| !ip.is_loopback())
        .collect()
}

/// Order-independent comparison of two address sets
pub fn same_addresses(a: &[Ipv4Addr], b: &[Ipv4Addr]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

/// First address that is not link-local, else the first one
pub fn select_host(addresses: &[Ipv4Addr]) -> Ipv4Addr {
    addresses
        .iter()
        .find(|ip| !ip.is_link_local())
        .or_else(|| addresses.first())
        .copied()
        .unwrap_or(Ipv4Addr::UNSPECIFIED)
}

async fn discover(ctx: &BuildContext, key: &VmKey) -> Result<Vec<Ipv4Addr>> {
    let settings = &ctx.settings;
    let started = Instant::now();
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match ctx.gateway.guest_agent_networks(key).await {
            Ok(interfaces) => {
                let addresses = flatten_addresses(&interfaces);
                if !addresses.is_empty() {
                    return Ok(addresses);
                }
                tracing::debug!(vm_key = %key, attempt, "Guest agent has no IPv4 address yet");
            }
            Err(e) => {
                tracing::debug!(vm_key = %key, attempt, "Guest agent query failed: {}", e);
            }
        }

        let elapsed = started.elapsed();
        if elapsed >= settings.ip_wait_timeout {
            return Err(BuildError::GuestAgentTimeout {
                waited: elapsed,
                addresses: Vec::new(),
            });
        }
        let remaining = settings.ip_wait_timeout - elapsed;
        ctx.sleep(
            settings.guest_agent_poll_interval.min(remaining),
            AddressResolver::NAME,
        )
        .await?;
    }
}

/// Runs on its own clock from first discovery, bounded by the settle budget
async fn settle(ctx: &BuildContext, key: &VmKey, first: Vec<Ipv4Addr>) -> Result<Vec<Ipv4Addr>> {
    let settings = &ctx.settings;
    let required = settings.settle_ticks();
    let budget = settings.settle_budget();
    let started = Instant::now();
    let mut current = first;
    let mut stable_ticks = 0u32;
    let mut restarts = 0u32;

    loop {
        let elapsed = started.elapsed();
        if elapsed >= budget {
            return Err(BuildError::AddressSettleTimeout {
                waited: elapsed,
                addresses: current,
            });
        }
        let remaining = budget - elapsed;
        ctx.sleep(
            settings.ip_settle_poll_interval.min(remaining),
            AddressResolver::NAME,
        )
        .await?;

        // A hard error here means the link flapped; do not trust the address
        let interfaces = ctx
            .gateway
            .guest_agent_networks(key)
            .await
            .map_err(|cause| BuildError::AgentConnectionLost { cause })?;
        let observed = flatten_addresses(&interfaces);

        if observed.is_empty() {
            tracing::debug!(vm_key = %key, "Guest agent lost its addresses, settle window reset");
            stable_ticks = 0;
            continue;
        }

        if same_addresses(&observed, &current) {
            stable_ticks += 1;
            tracing::debug!(vm_key = %key, stable_ticks, required, "Addresses unchanged");
            if stable_ticks >= required {
                tracing::debug!(vm_key = %key, restarts, "Addresses settled");
                return Ok(observed);
            }
        } else {
            restarts += 1;
            tracing::info!(
                vm_key = %key,
                "Addresses changed {:?} -> {:?}, restarting settle window",
                current,
                observed
            );
            current = observed;
            stable_ticks = 0;
        }
    }
}

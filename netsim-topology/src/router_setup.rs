//! Phase B: per-router namespace, veth pair per interface (attached to the subnet bridge on
//! the hidden-mesh side), addresses, routes, policy rules, and ipset/iptables replay.

use std::fs::File;
use std::os::fd::AsRawFd;

use netsim_batch::{BatchScript, ShmBlob};
use netsim_facts::{Router, DEFAULT_MTU};
use netsim_registry::SharedRegistry;
use rtnetlink::Handle;
use tracing::{debug, info, warn};

use crate::error::TopologyError;
use crate::interrupt::Interrupt;
use crate::naming::{subnet_for_address, veth_names, HIDDEN_NS};
use crate::netlink_ops::{
    add_address, add_route, add_rule, connect_in_netns, create_veth_pair, link_index, rename_link,
    set_link_address, set_link_master, set_link_mtu, set_link_netns, set_link_up,
};
use crate::netns::{create_namespace, netns_path, write_sysctl_in_netns};

#[derive(Debug, Default, Clone, Copy)]
pub struct RouterStats {
    pub interfaces_created: u32,
    pub routes_added: u32,
    pub rules_added: u32,
}

/// Materializes one router's namespace, interfaces, routes, rules, and netfilter state.
///
/// `root_handle` creates veth pairs (they're born in the namespace the main process itself
/// runs in, same as the original tool's un-namespaced `ip link add veth`); `mesh_handle`
/// attaches the hidden side of each pair to its subnet bridge.
pub async fn setup_router(
    router: &Router,
    registry: &SharedRegistry,
    root_handle: &Handle,
    mesh_handle: &Handle,
    interrupt: &Interrupt,
    verbose: u8,
) -> Result<RouterStats, TopologyError> {
    if interrupt.is_set() {
        return Err(TopologyError::Interrupted);
    }

    let router_code = registry.get_or_create_router_code(&router.name)?;
    if verbose >= 1 {
        info!(router = router.name, code = router_code, "setting up router");
    }

    if verbose >= 1 && crate::netns::namespace_exists(&router.name) {
        tracing::warn!(router = router.name, "namespace already exists, reusing it");
    }
    create_namespace(&router.name)?;
    write_sysctl_in_netns(&router.name, "/proc/sys/net/ipv4/ip_forward", "1")?;
    write_sysctl_in_netns(&router.name, "/proc/sys/net/ipv6/conf/all/forwarding", "1")?;

    let (router_handle, _task) = connect_in_netns(&router.name).await?;

    let lo_idx = link_index(&router_handle, "lo").await?;
    set_link_up(&router_handle, lo_idx).await?;

    let router_ns_file = File::open(netns_path(&router.name))
        .map_err(|e| TopologyError::NamespaceOpen(netns_path(&router.name), e))?;
    let hidden_ns_file = File::open(netns_path(HIDDEN_NS))
        .map_err(|e| TopologyError::NamespaceOpen(netns_path(HIDDEN_NS), e))?;

    let mut stats = RouterStats::default();

    for iface in router.interfaces.iter().filter(|i| !i.is_loopback()) {
        if interrupt.is_set() {
            break;
        }

        let iface_code = registry.get_or_create_interface_code(&router_code, &iface.name)?;
        let (veth_router, veth_hidden) = veth_names(&router_code, &iface_code);

        create_veth_pair(root_handle, &veth_router, &veth_hidden).await?;
        stats.interfaces_created += 1;

        let router_side_idx = link_index(root_handle, &veth_router).await?;
        set_link_netns(root_handle, router_side_idx, router_ns_file.as_raw_fd()).await?;

        let hidden_side_idx = link_index(root_handle, &veth_hidden).await?;
        set_link_netns(root_handle, hidden_side_idx, hidden_ns_file.as_raw_fd()).await?;

        // The link indexes above were assigned in the root namespace; each side now has a
        // (possibly different) index in the namespace it was just moved into.
        let renamed_idx = link_index(&router_handle, &veth_router).await?;
        rename_link(&router_handle, renamed_idx, &iface.name).await?;

        if let Some(mac) = &iface.mac {
            set_link_address(&router_handle, renamed_idx, mac).await?;
        }
        for addr in iface.ipv4_addresses() {
            add_address(&router_handle, renamed_idx, addr).await?;
        }
        if iface.up {
            set_link_up(&router_handle, renamed_idx).await?;
        }
        if iface.mtu != DEFAULT_MTU {
            set_link_mtu(&router_handle, renamed_idx, iface.mtu).await?;
        }

        if let Some(subnet) = iface.first_ipv4().and_then(|a| subnet_for_address(&a.ip)) {
            if let Some((bridge_name, _)) = registry.find_bridge_by_subnet(&subnet) {
                let mesh_side_idx = link_index(mesh_handle, &veth_hidden).await?;
                let bridge_idx = link_index(mesh_handle, &bridge_name).await?;
                set_link_master(mesh_handle, mesh_side_idx, bridge_idx).await?;
                set_link_up(mesh_handle, mesh_side_idx).await?;
            }
        }

        debug!(router = router.name, interface = iface.name, "interface configured");
    }

    // Route/rule application is best-effort per entry: many routes reference tables the
    // kernel only populates lazily via other rules, so a failure here is expected and should
    // not abort the rest of this router's setup (the original tool's batch queued every
    // command with `2>/dev/null || true` for the same reason).
    for route in &router.routes {
        if interrupt.is_set() {
            break;
        }
        match add_route(&router_handle, route).await {
            Ok(()) => stats.routes_added += 1,
            Err(e) => warn!(router = router.name, route = route.to_command(), error = %e, "route add failed, continuing"),
        }
    }

    for rule in &router.rules {
        if interrupt.is_set() {
            break;
        }
        match add_rule(&router_handle, rule).await {
            Ok(()) => stats.rules_added += 1,
            Err(e) => warn!(router = router.name, rule = rule.to_command(), error = %e, "rule add failed, continuing"),
        }
    }

    apply_netfilter_state(router, verbose)?;

    if verbose >= 1 {
        info!(router = router.name, "router setup complete");
    }

    Ok(stats)
}

/// ipset/iptables have no stable programmatic restore API, so these two stay shelled out to
/// the same tools the facts were captured with, staged through shared memory like the
/// original tool's `apply_ipset_with_shm`/`apply_iptables_with_shm`.
fn apply_netfilter_state(router: &Router, verbose: u8) -> Result<(), TopologyError> {
    let mut batch = BatchScript::new(None)?;
    batch.add(Some(&router.name), "ipset flush 2>/dev/null || true")?;
    batch.add(Some(&router.name), "ipset destroy 2>/dev/null || true")?;

    let mut blobs = Vec::new();
    if !router.ipset_save.is_empty() {
        let blob = ShmBlob::write(&format!("ipset_{}", router.name), &router.ipset_save)?;
        batch.add(Some(&router.name), &format!("ipset restore < {}", blob.path()))?;
        blobs.push(blob);
    }
    if !router.iptables_save.is_empty() {
        let blob = ShmBlob::write(&format!("iptables_{}", router.name), &router.iptables_save)?;
        batch.add(Some(&router.name), &format!("iptables-restore < {}", blob.path()))?;
        blobs.push(blob);
    }

    batch.execute(verbose >= 2)?;
    drop(blobs);
    Ok(())
}

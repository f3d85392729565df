//! Phase A: the hidden mesh namespace and one bridge per subnet observed across every
//! router's interfaces. Runs once, sequentially, before any per-router namespace exists.

use netsim_facts::Router;
use netsim_registry::SharedRegistry;
use rtnetlink::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::TopologyError;
use crate::interrupt::Interrupt;
use crate::naming::{bridge_name_for_subnet, subnet_for_address, HIDDEN_NS};
use crate::netlink_ops::{connect_in_netns, create_bridge, link_index, set_link_up};
use crate::netns::{create_namespace, write_sysctl_in_netns};

pub struct HiddenMesh {
    pub handle: Handle,
    _task: JoinHandle<()>,
}

impl HiddenMesh {
    /// Creates the hidden namespace and a bridge for every distinct subnet across `routers`'
    /// interfaces, registering each in `registry` so phase B can look bridges up by subnet.
    /// Returns the number of bridges actually created (as opposed to reused from a previous
    /// run's registry state).
    pub async fn bootstrap(
        registry: &SharedRegistry,
        routers: &[Router],
        interrupt: &Interrupt,
    ) -> Result<(Self, u32), TopologyError> {
        create_namespace(HIDDEN_NS)?;
        write_sysctl_in_netns(HIDDEN_NS, "/proc/sys/net/ipv4/ip_forward", "1")?;
        write_sysctl_in_netns(HIDDEN_NS, "/proc/sys/net/ipv6/conf/all/forwarding", "1")?;
        let (handle, task) = connect_in_netns(HIDDEN_NS).await?;
        let mesh = Self { handle, _task: task };

        let lo_idx = link_index(&mesh.handle, "lo").await?;
        set_link_up(&mesh.handle, lo_idx).await?;

        let mut subnets = Vec::new();
        for router in routers {
            if interrupt.is_set() {
                break;
            }
            for iface in &router.interfaces {
                for addr in iface.ipv4_addresses() {
                    if let Some(subnet) = subnet_for_address(&addr.ip) {
                        if !subnets.contains(&subnet) {
                            subnets.push(subnet);
                        }
                    }
                }
            }
        }

        info!(count = subnets.len(), "creating subnet bridges");

        let mut bridges_created = 0;
        for subnet in &subnets {
            if interrupt.is_set() {
                break;
            }
            let Some(bridge_name) = bridge_name_for_subnet(subnet) else {
                continue;
            };

            registry.register_bridge(&bridge_name, subnet)?;
            let (name, already_created) = registry
                .find_bridge_by_subnet(subnet)
                .expect("just registered");

            if already_created {
                debug!(bridge = name, subnet, "bridge already created by a previous run");
                continue;
            }

            create_bridge(&mesh.handle, &name).await?;
            let idx = link_index(&mesh.handle, &name).await?;
            set_link_up(&mesh.handle, idx).await?;
            registry.mark_bridge_created(&name);
            bridges_created += 1;
            debug!(bridge = name, subnet, "created bridge");
        }

        Ok((mesh, bridges_created))
    }
}

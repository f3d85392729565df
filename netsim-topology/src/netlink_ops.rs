//! Thin wrappers around `rtnetlink::Handle` for the handful of link/address/route/rule
//! operations the topology engine needs, tolerating the same "already there" races the
//! original tool's `2>/dev/null || true` shell-outs silently absorbed.

use std::net::{IpAddr, Ipv4Addr};
use std::os::fd::RawFd;
use std::str::FromStr;

use netlink_packet_route::rule::RuleAttribute;
use netsim_facts::{Address, AddressFamily, Route, Rule};
use rtnetlink::Error::NetlinkError;
use rtnetlink::Handle;
use tracing::{debug, trace};

use crate::error::TopologyError;

fn ignore_exists(result: Result<(), rtnetlink::Error>) -> Result<(), TopologyError> {
    match result {
        Ok(()) => Ok(()),
        Err(NetlinkError(ref e)) if e.raw_code() == -libc::EEXIST => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn ignore_missing(result: Result<(), rtnetlink::Error>) -> Result<(), TopologyError> {
    match result {
        Ok(()) => Ok(()),
        Err(NetlinkError(ref e)) if e.raw_code() == -libc::ENOENT => Ok(()),
        Err(e) => Err(e.into()),
    }
}

pub async fn link_index(handle: &Handle, name: &str) -> Result<u32, TopologyError> {
    use futures::TryStreamExt;

    let mut links = handle.link().get().match_name(name.to_string()).execute();
    let link = links
        .try_next()
        .await?
        .ok_or_else(|| TopologyError::Netlink(rtnetlink::Error::RequestFailed))?;
    Ok(link.header.index)
}

pub async fn create_bridge(handle: &Handle, name: &str) -> Result<(), TopologyError> {
    trace!(bridge = name, "creating bridge");
    ignore_exists(handle.link().add().bridge(name.to_string()).execute().await.map_err(Into::into))
}

pub async fn create_veth_pair(handle: &Handle, router_side: &str, hidden_side: &str) -> Result<(), TopologyError> {
    trace!(router_side, hidden_side, "creating veth pair");
    ignore_exists(
        handle
            .link()
            .add()
            .veth(router_side.to_string(), hidden_side.to_string())
            .execute()
            .await
            .map_err(Into::into),
    )
}

pub async fn set_link_netns(handle: &Handle, index: u32, ns_fd: RawFd) -> Result<(), TopologyError> {
    handle.link().set(index).setns_by_fd(ns_fd).execute().await?;
    Ok(())
}

pub async fn rename_link(handle: &Handle, index: u32, new_name: &str) -> Result<(), TopologyError> {
    handle.link().set(index).name(new_name.to_string()).execute().await?;
    Ok(())
}

pub async fn set_link_up(handle: &Handle, index: u32) -> Result<(), TopologyError> {
    handle.link().set(index).up().execute().await?;
    Ok(())
}

pub async fn set_link_master(handle: &Handle, index: u32, master_index: u32) -> Result<(), TopologyError> {
    handle.link().set(index).controller(master_index).execute().await?;
    Ok(())
}

pub async fn set_link_mtu(handle: &Handle, index: u32, mtu: u32) -> Result<(), TopologyError> {
    handle.link().set(index).mtu(mtu).execute().await?;
    Ok(())
}

pub async fn set_link_address(handle: &Handle, index: u32, mac: &str) -> Result<(), TopologyError> {
    let bytes = parse_mac(mac).ok_or_else(|| TopologyError::MalformedAddress("<interface>".into(), mac.to_string()))?;
    handle.link().set(index).address(bytes.to_vec()).execute().await?;
    Ok(())
}

fn parse_mac(mac: &str) -> Option<[u8; 6]> {
    let mut out = [0u8; 6];
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return None;
    }
    for (i, p) in parts.iter().enumerate() {
        out[i] = u8::from_str_radix(p, 16).ok()?;
    }
    Some(out)
}

pub async fn add_address(handle: &Handle, index: u32, addr: &Address) -> Result<(), TopologyError> {
    if addr.family != AddressFamily::V4 {
        // IPv6 address assignment mirrors the v4 path; omitted because no captured topology
        // in this project's facts files carries global-scope IPv6 addresses to replay.
        return Ok(());
    }

    let ip = addr
        .ip
        .split_once('/')
        .map(|(ip, _)| ip)
        .unwrap_or(&addr.ip);
    let ipv4 = Ipv4Addr::from_str(ip).map_err(|_| TopologyError::MalformedAddress(ip.to_string(), addr.ip.clone()))?;

    ignore_exists(
        handle
            .address()
            .add(index, ipv4.into(), addr.prefix_len)
            .execute()
            .await
            .map_err(Into::into),
    )
}

pub async fn add_route(handle: &Handle, route: &Route) -> Result<(), TopologyError> {
    // `default` (and the occasional bare, CIDR-less destination) means "no destination
    // prefix, gateway/device only" — the route covers 0.0.0.0/0.
    let is_default = matches!(route.destination.as_deref(), None | Some("default"));

    let mut request = handle.route().add().v4();

    if !is_default {
        let destination = route.destination.as_ref().expect("checked above");
        let Some((dest_ip, dest_prefix)) = destination.split_once('/') else {
            debug!(destination, "skipping route with no CIDR prefix (not IPv4, not default)");
            return Ok(());
        };
        let Ok(dest_ip) = Ipv4Addr::from_str(dest_ip) else {
            debug!(destination, "skipping non-IPv4 route destination");
            return Ok(());
        };
        let Ok(dest_prefix) = dest_prefix.parse::<u8>() else {
            debug!(destination, "skipping route with malformed prefix length");
            return Ok(());
        };
        request = request.destination_prefix(dest_ip, dest_prefix);
    }

    if let Some(gw) = route.gateway.as_deref().and_then(|g| Ipv4Addr::from_str(g).ok()) {
        request = request.gateway(gw);
    }
    if let Some(table) = route.table.as_deref().and_then(|t| t.parse::<u32>().ok()) {
        request = request.table_id(table);
    }

    ignore_exists(request.execute().await.map_err(Into::into))
}

fn parse_ipv4_cidr(value: &str) -> Option<(Ipv4Addr, u8)> {
    let (ip, prefix) = value.split_once('/').unwrap_or((value, "32"));
    Some((Ipv4Addr::from_str(ip).ok()?, prefix.parse().ok()?))
}

pub async fn add_rule(handle: &Handle, rule: &Rule) -> Result<(), TopologyError> {
    let mut request = handle.rule().add().v4().priority(rule.priority);

    if let Some(table) = rule.table.as_deref().and_then(|t| t.parse::<u32>().ok()) {
        request = request.table_id(table);
    }
    if let Some(fwmark) = rule.fwmark {
        request = request.fw_mark(fwmark);
    }

    if let Some(from) = rule.from.as_deref().and_then(parse_ipv4_cidr) {
        request.message_mut().header.src_len = from.1;
        request.message_mut().attributes.push(RuleAttribute::Source(IpAddr::V4(from.0)));
    }
    if let Some(to) = rule.to.as_deref().and_then(parse_ipv4_cidr) {
        request.message_mut().header.dst_len = to.1;
        request.message_mut().attributes.push(RuleAttribute::Destination(IpAddr::V4(to.0)));
    }
    if let Some(iif) = &rule.iif {
        request.message_mut().attributes.push(RuleAttribute::Iifname(iif.clone()));
    }
    if let Some(oif) = &rule.oif {
        request.message_mut().attributes.push(RuleAttribute::Oifname(oif.clone()));
    }

    ignore_exists(request.execute().await.map_err(Into::into))
}

pub async fn delete_link(handle: &Handle, index: u32) -> Result<(), TopologyError> {
    ignore_missing(handle.link().del(index).execute().await.map_err(Into::into))
}

/// Opens a netlink connection whose socket is bound inside `ns_name`'s network namespace.
///
/// The socket's namespace affiliation is fixed at `socket(2)` time, so the calling thread can
/// safely move back to its previous namespace as soon as this returns; the handle keeps
/// talking to `ns_name`'s kernel networking stack regardless of where the thread goes next.
pub async fn connect_in_netns(ns_name: &str) -> Result<(Handle, tokio::task::JoinHandle<()>), TopologyError> {
    let _guard = crate::netns::NetnsGuard::enter(ns_name)?;
    let (connection, handle, _) = rtnetlink::new_connection().map_err(TopologyError::NetlinkConnect)?;
    let task = tokio::spawn(connection);
    Ok((handle, task))
}

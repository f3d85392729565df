//! `debug-dump`: parses the facts directory and prints the resulting model without touching
//! the kernel. Exempt from the root check so it can be used to sanity-check a capture on a
//! workstation before running the real setup as root.

use std::path::Path;

use anyhow::Result;
use netsim_facts::Router;

#[allow(clippy::print_stdout)]
pub fn run(raw_facts_dir: &Path, router_filter: Option<&str>) -> Result<()> {
    let routers = netsim_facts::load_facts(raw_facts_dir)?;
    let matched: Vec<&Router> = routers
        .iter()
        .filter(|r| router_filter.is_none_or(|f| r.name == f))
        .collect();

    if matched.is_empty() {
        println!("no routers matched");
        return Ok(());
    }

    for router in matched {
        println!("router {}", router.name);
        for iface in &router.interfaces {
            let addrs: Vec<&str> = iface.addresses.iter().map(|a| a.ip.as_str()).collect();
            println!(
                "  {} mtu={} up={} mac={} addrs=[{}]",
                iface.name,
                iface.mtu,
                iface.up,
                iface.mac.as_deref().unwrap_or("-"),
                addrs.join(", "),
            );
        }
        for route in &router.routes {
            println!("  {}", route.to_command());
        }
        for rule in &router.rules {
            println!("  {}", rule.to_command());
        }
        println!(
            "  iptables_save={} bytes, ipset_save={} bytes",
            router.iptables_save.len(),
            router.ipset_save.len(),
        );
    }

    Ok(())
}

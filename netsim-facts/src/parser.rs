//! Line-oriented parsing of the `ip`/`iptables`/`ipset` output embedded in a facts file.

use crate::model::{Address, AddressFamily, Interface, Route, Rule, DEFAULT_MTU};
use crate::section::{extract_section, routing_table_sections};

/// Parses the `interfaces` section (`ip address show` output) into `Interface`s.
pub fn parse_interfaces(section: &str) -> Vec<Interface> {
    let mut interfaces = Vec::new();
    let mut current: Option<Interface> = None;

    for line in section.lines() {
        let trimmed = line.trim_start();

        if line.chars().next().is_some_and(|c| c.is_ascii_digit()) {
            if let Some(iface) = current.take() {
                interfaces.push(iface);
            }
            current = parse_interface_header(line);
        } else if let Some(iface) = current.as_mut() {
            if trimmed.starts_with("link/") {
                parse_link_line(trimmed, iface);
            } else if trimmed.starts_with("inet ") {
                if let Some(addr) = parse_inet_line(trimmed, AddressFamily::V4) {
                    iface.addresses.push(addr);
                }
            } else if trimmed.starts_with("inet6 ") {
                if let Some(addr) = parse_inet6_line(trimmed) {
                    iface.addresses.push(addr);
                }
            }
        }
    }

    if let Some(iface) = current.take() {
        interfaces.push(iface);
    }

    interfaces
}

/// Parses `"2: eth0: <BROADCAST,...,UP> mtu 1500 qdisc ... state UP"`, stripping a trailing
/// `@parent` VLAN suffix from the interface name.
fn parse_interface_header(line: &str) -> Option<Interface> {
    let after_index = line.split_once(':')?.1;
    let name_end = after_index.find([':', '@']).unwrap_or(after_index.len());
    let name = after_index[..name_end].trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut iface = Interface::new(name);

    if let Some(flags_start) = line.find('<') {
        if let Some(flags_end) = line[flags_start..].find('>') {
            let flags = &line[flags_start + 1..flags_start + flags_end];
            iface.up = flags.split(',').any(|f| f == "UP");
        }
    }

    iface.mtu = line
        .split_once("mtu ")
        .and_then(|(_, rest)| rest.split_whitespace().next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(DEFAULT_MTU);

    if let Some((_, rest)) = line.split_once("state ") {
        if rest.starts_with("DOWN") {
            iface.up = false;
        }
    }

    Some(iface)
}

fn parse_link_line(trimmed: &str, iface: &mut Interface) {
    if let Some(rest) = trimmed.strip_prefix("link/ether ") {
        iface.mac = rest.split_whitespace().next().map(str::to_string);
    }
    // `link/loopback` and `link/none` carry no MAC; nothing further to extract.
}

fn parse_inet_line(trimmed: &str, family: AddressFamily) -> Option<Address> {
    let rest = trimmed.strip_prefix("inet ")?;
    let ip = rest.split_whitespace().next()?;
    if !ip.contains('/') {
        return None;
    }

    let prefix_len = ip
        .rsplit_once('/')
        .and_then(|(_, p)| p.parse().ok())
        .unwrap_or(32);

    let broadcast = rest
        .split_once("brd ")
        .and_then(|(_, r)| r.split_whitespace().next())
        .map(str::to_string);

    let scope = rest
        .split_once("scope ")
        .and_then(|(_, r)| r.split_whitespace().next())
        .unwrap_or(Address::DEFAULT_SCOPE)
        .to_string();

    let secondary = rest.split_whitespace().any(|tok| tok == "secondary");

    Some(Address {
        ip: ip.to_string(),
        family,
        prefix_len,
        broadcast,
        scope,
        secondary,
    })
}

fn parse_inet6_line(trimmed: &str) -> Option<Address> {
    let rest = trimmed.strip_prefix("inet6 ")?;
    let ip = rest.split_whitespace().next()?;
    if ip.starts_with("fe80:") {
        return None; // link-local, dropped at parse time per spec
    }

    let prefix_len = ip
        .rsplit_once('/')
        .and_then(|(_, p)| p.parse().ok())
        .unwrap_or(128);

    let scope = rest
        .split_once("scope ")
        .and_then(|(_, r)| r.split_whitespace().next())
        .unwrap_or(Address::DEFAULT_SCOPE)
        .to_string();

    Some(Address {
        ip: ip.to_string(),
        family: AddressFamily::V6,
        prefix_len,
        broadcast: None,
        scope,
        secondary: false,
    })
}

/// Parses the `policy_rules` section (`ip rule show` output) into `Rule`s.
pub fn parse_rules(section: &str) -> Vec<Rule> {
    section
        .lines()
        .filter_map(parse_rule_line)
        .collect()
}

fn parse_rule_line(line: &str) -> Option<Rule> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (priority_str, rest) = line.split_once(':')?;
    let priority: u32 = priority_str.trim().parse().ok()?;

    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut rule = Rule {
        priority,
        from: None,
        to: None,
        iif: None,
        oif: None,
        fwmark: None,
        table: None,
        sport: None,
        dport: None,
        tos: None,
    };

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "from" if i + 1 < tokens.len() => {
                let val = tokens[i + 1];
                if val != "all" {
                    rule.from = Some(val.to_string());
                }
                i += 2;
            }
            "to" if i + 1 < tokens.len() => {
                rule.to = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "lookup" if i + 1 < tokens.len() => {
                rule.table = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "iif" if i + 1 < tokens.len() => {
                rule.iif = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "oif" if i + 1 < tokens.len() => {
                rule.oif = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "fwmark" if i + 1 < tokens.len() => {
                rule.fwmark = parse_hex_or_dec(tokens[i + 1]);
                i += 2;
            }
            "sport" if i + 1 < tokens.len() => {
                rule.sport = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "dport" if i + 1 < tokens.len() => {
                rule.dport = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "tos" if i + 1 < tokens.len() => {
                rule.tos = Some(tokens[i + 1].to_string());
                i += 2;
            }
            _ => i += 1,
        }
    }

    Some(rule)
}

fn parse_hex_or_dec(tok: &str) -> Option<u32> {
    let tok = tok.trim_end_matches('/').trim_end_matches(char::is_alphabetic);
    if let Some(hex) = tok.strip_prefix("0x") {
        u32::from_str_radix(hex, 16).ok()
    } else {
        tok.parse().ok()
    }
}

/// Enumerates every `routing_table[_<name>]` section and emits the verbatim `ip route add`
/// command for each non-empty line. Kept alongside the structured routes below for
/// `debug-dump` and diagnostics; the topology engine itself applies the structured form.
pub fn parse_raw_routes(content: &str) -> Vec<String> {
    let mut commands = Vec::new();

    for table in routing_table_sections(content) {
        let section_name = match &table {
            None => "routing_table".to_string(),
            Some(name) => format!("routing_table_{name}"),
        };
        let Some(body) = extract_section(content, &section_name) else {
            continue;
        };

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("EXIT_CODE:") {
                continue;
            }
            commands.push(match &table {
                None => format!("ip route add {line}"),
                Some(name) => format!("ip route add table {name} {line}"),
            });
        }
    }

    commands
}

/// Parses the same routing-table sections into structured [`Route`]s — this is the form the
/// topology engine actually replays into the kernel via `rtnetlink`.
pub fn parse_structured_routes(content: &str) -> Vec<Route> {
    let mut routes = Vec::new();

    for table in routing_table_sections(content) {
        let section_name = match &table {
            None => "routing_table".to_string(),
            Some(name) => format!("routing_table_{name}"),
        };
        let Some(body) = extract_section(content, &section_name) else {
            continue;
        };

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("EXIT_CODE:") {
                continue;
            }
            routes.push(parse_route_line(line, table.clone()));
        }
    }

    routes
}

fn parse_route_line(line: &str, table: Option<String>) -> Route {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let mut route = Route {
        table,
        ..Default::default()
    };

    if let Some(first) = tokens.first() {
        if *first != "via" && *first != "dev" {
            route.destination = Some((*first).to_string());
        }
    }

    let mut i = 0;
    while i < tokens.len() {
        match tokens[i] {
            "via" if i + 1 < tokens.len() => {
                route.gateway = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "dev" if i + 1 < tokens.len() => {
                route.device = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "src" if i + 1 < tokens.len() => {
                route.source = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "metric" if i + 1 < tokens.len() => {
                route.metric = tokens[i + 1].parse().ok();
                i += 2;
            }
            "proto" if i + 1 < tokens.len() => {
                route.protocol = Some(tokens[i + 1].to_string());
                i += 2;
            }
            "scope" if i + 1 < tokens.len() => {
                route.scope = Some(tokens[i + 1].to_string());
                i += 2;
            }
            _ => i += 1,
        }
    }

    route
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_interface_with_address() {
        let section = "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 qdisc pfifo_fast state UP\n    link/ether aa:bb:cc:dd:ee:01\n    inet 10.1.1.2/24 brd 10.1.1.255 scope global eth0";
        let ifaces = parse_interfaces(section);
        assert_eq!(ifaces.len(), 1);
        let eth0 = &ifaces[0];
        assert_eq!(eth0.name, "eth0");
        assert!(eth0.up);
        assert_eq!(eth0.mtu, 1500);
        assert_eq!(eth0.mac.as_deref(), Some("aa:bb:cc:dd:ee:01"));
        assert_eq!(eth0.addresses.len(), 1);
        assert_eq!(eth0.addresses[0].ip, "10.1.1.2/24");
        assert_eq!(eth0.addresses[0].broadcast.as_deref(), Some("10.1.1.255"));
    }

    #[test]
    fn state_down_overrides_up_flag() {
        let section = "3: eth1: <BROADCAST,MULTICAST,UP> mtu 1500 state DOWN\n    link/ether 00:00:00:00:00:01";
        let ifaces = parse_interfaces(section);
        assert!(!ifaces[0].up);
    }

    #[test]
    fn vlan_suffix_is_stripped() {
        let section = "3: eth0.100@eth0: <UP> mtu 1500";
        let ifaces = parse_interfaces(section);
        assert_eq!(ifaces[0].name, "eth0.100");
    }

    #[test]
    fn link_local_ipv6_is_dropped() {
        let section = "2: eth0: <UP> mtu 1500\n    inet6 fe80::1/64 scope link\n    inet6 2001:db8::1/64 scope global";
        let ifaces = parse_interfaces(section);
        assert_eq!(ifaces[0].addresses.len(), 1);
        assert_eq!(ifaces[0].addresses[0].ip, "2001:db8::1/64");
    }

    #[test]
    fn parses_fwmark_rule() {
        let rules = parse_rules("100:\tfrom 10.0.0.0/8 fwmark 0x10 lookup 200");
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.priority, 100);
        assert_eq!(rule.from.as_deref(), Some("10.0.0.0/8"));
        assert_eq!(rule.fwmark, Some(0x10));
        assert_eq!(rule.table.as_deref(), Some("200"));
    }

    #[test]
    fn from_all_is_dropped() {
        let rules = parse_rules("0:\tfrom all lookup local");
        assert_eq!(rules[0].from, None);
    }

    #[test]
    fn raw_routes_are_verbatim_with_table_prefix() {
        let content = "=== TSIM_SECTION_START:routing_table_200 ===\n---\n10.9.0.0/16 via 10.1.1.1 dev eth0\nEXIT_CODE:0\n=== TSIM_SECTION_END:routing_table_200 ===\n";
        let routes = parse_raw_routes(content);
        assert_eq!(routes, vec!["ip route add table 200 10.9.0.0/16 via 10.1.1.1 dev eth0"]);
    }

    #[test]
    fn structured_routes_extract_fields() {
        let content = "=== TSIM_SECTION_START:routing_table ===\n---\n10.9.0.0/16 via 10.1.1.1 dev eth0 metric 100\n=== TSIM_SECTION_END:routing_table ===\n";
        let routes = parse_structured_routes(content);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].destination.as_deref(), Some("10.9.0.0/16"));
        assert_eq!(routes[0].gateway.as_deref(), Some("10.1.1.1"));
        assert_eq!(routes[0].device.as_deref(), Some("eth0"));
        assert_eq!(routes[0].metric, Some(100));
    }

    #[test]
    fn empty_routing_table_section_yields_no_routes() {
        let content = "=== TSIM_SECTION_START:routing_table_200 ===\n---\nEXIT_CODE:0\n=== TSIM_SECTION_END:routing_table_200 ===\n";
        assert!(parse_raw_routes(content).is_empty());
    }
}

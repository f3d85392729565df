//! Deterministic short names for everything the topology engine creates. Kernel interface
//! names are limited to 15 characters, which is what forces the router/interface short-code
//! scheme in the first place.

pub const HIDDEN_NS: &str = "hidden-mesh";

/// Computes the `/`-separated network address of `ip_with_prefix` (e.g. `10.1.1.5/24` ->
/// `10.1.1.0/24`), the key the hidden-mesh bridge registry is keyed on.
pub fn subnet_for_address(ip_with_prefix: &str) -> Option<String> {
    let (ip, prefix_str) = ip_with_prefix.split_once('/')?;
    let prefix: u32 = prefix_str.parse().ok()?;
    if prefix > 32 {
        return None;
    }

    let octets: Vec<u32> = ip.split('.').map(|o| o.parse().ok()).collect::<Option<_>>()?;
    if octets.len() != 4 {
        return None;
    }

    let addr = (octets[0] << 24) | (octets[1] << 16) | (octets[2] << 8) | octets[3];
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let network = addr & mask;

    Some(format!(
        "{}.{}.{}.{}/{}",
        (network >> 24) & 0xFF,
        (network >> 16) & 0xFF,
        (network >> 8) & 0xFF,
        network & 0xFF,
        prefix,
    ))
}

/// Derives the bridge name for `subnet` (`10.1.1.0/24` -> `b01000100100024`): `b` followed
/// by the four octets zero-padded to 3 digits and the prefix zero-padded to 2 digits, 15
/// characters total.
pub fn bridge_name_for_subnet(subnet: &str) -> Option<String> {
    let (net, prefix_str) = subnet.split_once('/')?;
    let prefix: u32 = prefix_str.parse().ok()?;
    let octets: Vec<u32> = net.split('.').map(|o| o.parse().ok()).collect::<Option<_>>()?;
    if octets.len() != 4 {
        return None;
    }

    Some(format!(
        "b{:03}{:03}{:03}{:03}{:02}",
        octets[0], octets[1], octets[2], octets[3], prefix
    ))
}

/// Veth pair names for one router interface: the end that lives in the router's namespace
/// (renamed to the real interface name once moved) and the end that stays in the hidden mesh
/// namespace, attached to the subnet's bridge.
pub fn veth_names(router_code: &str, interface_code: &str) -> (String, String) {
    (
        format!("{router_code}{interface_code}r"),
        format!("{router_code}{interface_code}h"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_network_address() {
        assert_eq!(subnet_for_address("10.1.1.5/24").as_deref(), Some("10.1.1.0/24"));
        assert_eq!(subnet_for_address("192.168.1.200/30").as_deref(), Some("192.168.1.200/30"));
        assert_eq!(subnet_for_address("10.0.0.1/8").as_deref(), Some("10.0.0.0/8"));
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(subnet_for_address("not-an-ip").is_none());
        assert!(subnet_for_address("10.1.1.5/33").is_none());
    }

    #[test]
    fn derives_bridge_name_from_subnet() {
        assert_eq!(bridge_name_for_subnet("10.1.1.0/24").as_deref(), Some("b01000100100024"));
        assert_eq!(bridge_name_for_subnet("10.1.1.0/24").unwrap().len(), 15);
    }

    #[test]
    fn veth_names_stay_under_kernel_limit() {
        let (r, h) = veth_names("r007", "i012");
        assert_eq!(r, "r007i012r");
        assert_eq!(h, "r007i012h");
        assert!(r.len() <= 15);
        assert!(h.len() <= 15);
    }
}

//! In-memory representation of one router's captured network state.

/// A router, identified by the stem of its facts file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    pub name: String,
    pub interfaces: Vec<Interface>,
    /// Verbatim `ip route add ...` commands, one per line of every `routing_table[_<name>]`
    /// section. Kept for `debug-dump` and diagnostics; the topology engine applies routes
    /// through the structured `routes` field below instead (see DESIGN.md).
    pub raw_routes: Vec<String>,
    /// The same routing-table sections, parsed into structured form. This is what the
    /// topology engine actually replays, one `rtnetlink` route-add call per entry.
    pub routes: Vec<Route>,
    pub rules: Vec<Rule>,
    pub iptables_save: Vec<u8>,
    pub ipset_save: Vec<u8>,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interfaces: Vec::new(),
            raw_routes: Vec::new(),
            routes: Vec::new(),
            rules: Vec::new(),
            iptables_save: Vec::new(),
            ipset_save: Vec::new(),
        }
    }

    pub fn interface(&self, name: &str) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub mac: Option<String>,
    pub mtu: u32,
    pub up: bool,
    pub addresses: Vec<Address>,
}

pub const DEFAULT_MTU: u32 = 1500;

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: None,
            mtu: DEFAULT_MTU,
            up: false,
            addresses: Vec::new(),
        }
    }

    pub fn is_loopback(&self) -> bool {
        self.name == "lo"
    }

    /// First IPv4 address, if any — the one the topology engine keys bridge lookup on.
    pub fn first_ipv4(&self) -> Option<&Address> {
        self.addresses.iter().find(|a| a.family == AddressFamily::V4)
    }

    pub fn ipv4_addresses(&self) -> impl Iterator<Item = &Address> {
        self.addresses.iter().filter(|a| a.family == AddressFamily::V4)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub ip: String,
    pub family: AddressFamily,
    pub prefix_len: u8,
    pub broadcast: Option<String>,
    pub scope: String,
    pub secondary: bool,
}

impl Address {
    pub const DEFAULT_SCOPE: &'static str = "global";
}

/// Structured routing-table entry, replayed directly by the topology engine via `rtnetlink`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub destination: Option<String>,
    pub gateway: Option<String>,
    pub device: Option<String>,
    pub source: Option<String>,
    pub table: Option<String>,
    pub metric: Option<u32>,
    pub protocol: Option<String>,
    pub scope: Option<String>,
}

impl Route {
    /// Synthesizes the `ip route add [...]` command text this structure represents, for
    /// `debug-dump` output and log messages — the topology engine itself applies the fields
    /// directly through `rtnetlink` rather than shelling out to this string.
    pub fn to_command(&self) -> String {
        let mut cmd = String::from("ip route add");

        if let Some(table) = &self.table {
            cmd.push_str(" table ");
            cmd.push_str(table);
        }
        if let Some(dest) = &self.destination {
            cmd.push(' ');
            cmd.push_str(dest);
        }
        if let Some(gw) = &self.gateway {
            cmd.push_str(" via ");
            cmd.push_str(gw);
        }
        if let Some(dev) = &self.device {
            cmd.push_str(" dev ");
            cmd.push_str(dev);
        }
        if let Some(src) = &self.source {
            cmd.push_str(" src ");
            cmd.push_str(src);
        }
        if let Some(metric) = &self.metric {
            cmd.push_str(" metric ");
            cmd.push_str(&metric.to_string());
        }
        if let Some(proto) = &self.protocol {
            cmd.push_str(" proto ");
            cmd.push_str(proto);
        }
        if let Some(scope) = &self.scope {
            cmd.push_str(" scope ");
            cmd.push_str(scope);
        }

        cmd
    }
}

/// A policy routing rule (`ip rule` entry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub priority: u32,
    pub from: Option<String>,
    pub to: Option<String>,
    pub iif: Option<String>,
    pub oif: Option<String>,
    pub fwmark: Option<u32>,
    pub table: Option<String>,
    pub sport: Option<String>,
    pub dport: Option<String>,
    pub tos: Option<String>,
}

impl Rule {
    /// Synthesizes the `ip rule add priority ...` command text this rule represents, for
    /// `debug-dump` output and log messages — the topology engine applies the fields directly
    /// through `rtnetlink` rather than shelling out to this string.
    pub fn to_command(&self) -> String {
        let mut cmd = format!("ip rule add priority {}", self.priority);

        if let Some(from) = &self.from {
            cmd.push_str(" from ");
            cmd.push_str(from);
        }
        if let Some(to) = &self.to {
            cmd.push_str(" to ");
            cmd.push_str(to);
        }
        if let Some(iif) = &self.iif {
            cmd.push_str(" iif ");
            cmd.push_str(iif);
        }
        if let Some(oif) = &self.oif {
            cmd.push_str(" oif ");
            cmd.push_str(oif);
        }
        if let Some(fwmark) = &self.fwmark {
            cmd.push_str(&format!(" fwmark 0x{fwmark:x}"));
        }
        if let Some(table) = &self.table {
            cmd.push_str(" lookup ");
            cmd.push_str(table);
        }

        cmd.push_str(" 2>/dev/null || true");
        cmd
    }
}

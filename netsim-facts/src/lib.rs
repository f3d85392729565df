//! Parses the raw facts files produced by a traceroute-simulator capture run into the typed
//! [`Router`] model the topology engine materializes.

mod error;
mod model;
mod parser;
mod section;

pub use error::FactsError;
pub use model::{Address, AddressFamily, Interface, Route, Router, Rule, DEFAULT_MTU};
pub use parser::{parse_interfaces, parse_raw_routes, parse_rules, parse_structured_routes};
pub use section::{extract_section, routing_table_sections};

use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

const FACTS_SUFFIX: &str = "_facts.txt";

/// Scans `dir` for `*_facts.txt` files in deterministic (sorted-by-filename) order and parses
/// each into a [`Router`].
///
/// A router whose file exists but cannot be read is skipped with a warning rather than
/// aborting the whole run; the directory itself being unreadable is fatal.
pub fn load_facts(dir: &Path) -> Result<Vec<Router>, FactsError> {
    let mut paths: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(FACTS_SUFFIX))
        })
        .map(|entry| entry.into_path())
        .collect();

    if paths.is_empty() && !dir.is_dir() {
        let err = std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory");
        return Err(FactsError::DirectoryUnreadable(dir.to_path_buf(), err));
    }

    paths.sort();

    let mut routers = Vec::with_capacity(paths.len());
    for path in paths {
        let router_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(FACTS_SUFFIX))
            .unwrap_or_default()
            .to_string();

        match std::fs::read_to_string(&path) {
            Ok(content) => routers.push(parse_router(&router_name, &content)),
            Err(source) => warn!(
                router = router_name,
                path = %path.display(),
                "skipping unreadable facts file: {source}",
            ),
        }
    }

    Ok(routers)
}

fn parse_router(name: &str, content: &str) -> Router {
    let mut router = Router::new(name);

    if let Some(section) = extract_section(content, "interfaces") {
        router.interfaces = parse_interfaces(section);
    }
    if let Some(section) = extract_section(content, "policy_rules") {
        router.rules = parse_rules(section);
    }

    router.raw_routes = parse_raw_routes(content);
    router.routes = parse_structured_routes(content);

    if let Some(section) = extract_section(content, "iptables_save") {
        router.iptables_save = section.as_bytes().to_vec();
    }
    if let Some(section) = extract_section(content, "ipset_save") {
        router.ipset_save = section.as_bytes().to_vec();
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_facts() -> &'static str {
        "\
=== TSIM_SECTION_START:interfaces ===
---
2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 state UP
    link/ether aa:bb:cc:dd:ee:01
    inet 10.1.1.2/24 brd 10.1.1.255 scope global eth0
EXIT_CODE:0
=== TSIM_SECTION_END:interfaces ===
=== TSIM_SECTION_START:policy_rules ===
---
0:\tfrom all lookup local
EXIT_CODE:0
=== TSIM_SECTION_END:policy_rules ===
=== TSIM_SECTION_START:routing_table ===
---
default via 10.1.1.1 dev eth0
EXIT_CODE:0
=== TSIM_SECTION_END:routing_table ===
=== TSIM_SECTION_START:iptables_save ===
---
*filter
COMMIT
EXIT_CODE:0
=== TSIM_SECTION_END:iptables_save ===
"
    }

    #[test]
    fn loads_routers_sorted_by_filename() {
        let _guard = netsim_logging::test("warn");
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("routerB_facts.txt"), sample_facts()).unwrap();
        fs::write(dir.path().join("routerA_facts.txt"), sample_facts()).unwrap();

        let routers = load_facts(dir.path()).unwrap();
        assert_eq!(routers.len(), 2);
        assert_eq!(routers[0].name, "routerA");
        assert_eq!(routers[1].name, "routerB");

        let router = &routers[0];
        assert_eq!(router.interfaces.len(), 1);
        assert_eq!(router.interfaces[0].addresses[0].ip, "10.1.1.2/24");
        assert_eq!(router.raw_routes, vec!["ip route add default via 10.1.1.1 dev eth0"]);
        assert!(!router.iptables_save.is_empty());
    }

    #[test]
    fn ignores_non_facts_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "not a facts file").unwrap();

        let routers = load_facts(dir.path()).unwrap();
        assert!(routers.is_empty());
    }

    #[test]
    fn unreadable_directory_is_fatal() {
        let missing = Path::new("/nonexistent/path/for/netsim-facts-tests");
        assert!(load_facts(missing).is_err());
    }
}

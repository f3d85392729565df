#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("failed to create network namespace {0}")]
    NamespaceCreate(String, #[source] nix::Error),

    #[error("failed to enter network namespace {0}")]
    NamespaceEnter(String, #[source] nix::Error),

    #[error("failed to open namespace handle at {0}")]
    NamespaceOpen(std::path::PathBuf, #[source] std::io::Error),

    #[error("netlink operation failed: {0}")]
    Netlink(#[from] rtnetlink::Error),

    #[error("failed to open netlink connection")]
    NetlinkConnect(#[source] std::io::Error),

    #[error(transparent)]
    Registry(#[from] netsim_registry::RegistryError),

    #[error(transparent)]
    Batch(#[from] netsim_batch::BatchError),

    #[error("setup was interrupted")]
    Interrupted,

    #[error("router {0} referenced an address that is not valid IPv4/CIDR: {1}")]
    MalformedAddress(String, String),
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("failed to {0} POSIX shared memory segment {1}")]
    Shm(&'static str, &'static str, #[source] nix::Error),

    #[error("failed to size shared memory segment to {0} bytes")]
    Truncate(usize, #[source] nix::Error),

    #[error("failed to map shared memory segment")]
    Mmap(#[source] nix::Error),

    #[error("router registry is full ({0} routers)")]
    RouterTableFull(usize),

    #[error("interface registry is full for router {0} ({1} interfaces)")]
    InterfaceTableFull(String, usize),

    #[error("bridge registry is full ({0} bridges)")]
    BridgeTableFull(usize),

    #[error("router code {0:?} is not well-formed")]
    MalformedRouterCode(String),
}

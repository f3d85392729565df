#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    #[error("namespace name {0:?} is invalid")]
    InvalidNamespaceName(String),

    #[error("namespace {0:?} does not exist")]
    UnknownNamespace(String),

    #[error("command {0:?} is not in the allowed list")]
    CommandNotAllowed(String),

    #[error("argument {0:?} is not allowed for command {1:?}")]
    ArgumentNotAllowed(String, String),

    #[error("failed to open namespace file {0:?}")]
    OpenNamespace(String, #[source] std::io::Error),

    #[error("failed to enter namespace {0:?}")]
    EnterNamespace(String, #[source] nix::Error),

    #[error("failed to drop privileges to uid {0}/gid {1}")]
    DropPrivileges(u32, u32, #[source] nix::Error),

    #[error("failed to exec {0:?}")]
    Exec(String, #[source] nix::Error),

    #[error("failed to list namespace directory")]
    ListNamespaces(#[source] std::io::Error),
}

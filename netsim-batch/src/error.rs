#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("failed to create shared memory segment {0}")]
    Create(String, #[source] nix::Error),

    #[error("failed to size shared memory segment to {0} bytes")]
    Truncate(usize, #[source] nix::Error),

    #[error("failed to map shared memory segment")]
    Mmap(#[source] nix::Error),

    #[error("batch script buffer is full ({capacity} bytes)")]
    BufferFull { capacity: usize },

    #[error("failed to fork batch executor process")]
    Fork(#[source] nix::Error),

    #[error("failed to exec {0}")]
    Exec(&'static str, #[source] nix::Error),

    #[error("failed to wait for batch executor process")]
    Wait(#[source] nix::Error),
}

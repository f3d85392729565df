use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FactsError {
    #[error("raw facts directory {0} does not exist or is not readable")]
    DirectoryUnreadable(PathBuf, #[source] std::io::Error),

    #[error("facts file for router {router} could not be read")]
    RouterFileUnreadable {
        router: String,
        #[source]
        source: std::io::Error,
    },
}

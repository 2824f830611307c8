use thiserror::Error;

use crate::{db_types::Chain, scanners::ScanError, traits::StoreError};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Unknown chain: {0}")]
    UnknownChain(String),
    #[error("{0} is not configured for scanning")]
    ChainUnavailable(Chain),
    #[error("The watcher is shutting down")]
    ShuttingDown,
    #[error("Could not initialise the watcher. {0}")]
    Initialization(String),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Scan(#[from] ScanError),
}

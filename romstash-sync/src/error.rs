use thiserror::Error;

use romstash_remote::FetchError;
use romstash_store::StoreError;

/// Errors from save-file reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local file could not be matched to a catalog item, so there is
    /// no remote identity to sync against.
    #[error("no catalog match for {0}")]
    UnresolvedRom(String),
}

use thiserror::Error;

use romstash_remote::FetchError;
use romstash_store::StoreError;

/// Errors from cache orchestration: a fetch, persistence, or filesystem
/// failure, or artwork bytes that are not a decodable image.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image for game {game_id}: {reason}")]
    InvalidImage { game_id: i64, reason: String },
}

use thiserror::Error;

/// Errors from store operations.
///
/// A single-row lookup that finds nothing is `Ok(None)`, never an error:
/// absence is the expected "not cached yet" signal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store was torn down (or its lock poisoned) under a live caller.
    #[error("store is closed")]
    Closed,

    /// A malformed cache key was supplied.
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    /// Failure opening the database or creating the schema.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Any other failure, wrapped with operation context so callers can log
    /// structured diagnostics.
    #[error("store {op} [{entity}:{key}]: {source}")]
    Op {
        op: &'static str,
        entity: &'static str,
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StoreError {
    pub(crate) fn op(
        op: &'static str,
        entity: &'static str,
        key: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Op {
            op,
            entity,
            key: key.into(),
            source: source.into(),
        }
    }
}

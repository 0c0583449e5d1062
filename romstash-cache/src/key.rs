//! Cache keys naming one listing scope: a platform or a collection.

use std::fmt;

use romstash_remote::{Collection, CollectionKind, GameQuery};
use romstash_store::StoreError;

/// One populated scope of the cache. Freshness, prefetch deduplication,
/// and scoped refreshes all hang off these keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Platform(i64),
    Collection(i64),
    SmartCollection(i64),
    VirtualCollection(String),
}

impl CacheKey {
    /// The key for a collection, following its identity scheme. `None`
    /// when the collection carries no usable identity.
    pub fn for_collection(collection: &Collection) -> Option<Self> {
        match collection.kind {
            CollectionKind::Regular => collection.remote_id.map(Self::Collection),
            CollectionKind::Smart => collection.remote_id.map(Self::SmartCollection),
            CollectionKind::Virtual => collection
                .virtual_id
                .clone()
                .map(Self::VirtualCollection),
        }
    }

    /// Parse the canonical string form produced by `Display`.
    pub fn parse(s: &str) -> Result<Self, StoreError> {
        if let Some(rest) = s.strip_prefix("smart_collection_") {
            let id = rest
                .parse()
                .map_err(|_| StoreError::InvalidKey(s.to_string()))?;
            return Ok(Self::SmartCollection(id));
        }
        if let Some(rest) = s.strip_prefix("virtual_collection_") {
            if rest.is_empty() {
                return Err(StoreError::InvalidKey(s.to_string()));
            }
            return Ok(Self::VirtualCollection(rest.to_string()));
        }
        if let Some(rest) = s.strip_prefix("collection_") {
            let id = rest
                .parse()
                .map_err(|_| StoreError::InvalidKey(s.to_string()))?;
            return Ok(Self::Collection(id));
        }
        if let Some(rest) = s.strip_prefix("platform_") {
            let id = rest
                .parse()
                .map_err(|_| StoreError::InvalidKey(s.to_string()))?;
            return Ok(Self::Platform(id));
        }
        Err(StoreError::InvalidKey(s.to_string()))
    }

    /// An unpaginated game query scoped to this key.
    pub fn query(&self) -> GameQuery {
        let mut query = GameQuery::default();
        match self {
            Self::Platform(id) => query.platform_id = Some(*id),
            Self::Collection(id) => query.collection_id = Some(*id),
            Self::SmartCollection(id) => query.smart_collection_id = Some(*id),
            Self::VirtualCollection(id) => query.virtual_collection_id = Some(id.clone()),
        }
        query
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Platform(id) => write!(f, "platform_{id}"),
            Self::Collection(id) => write!(f, "collection_{id}"),
            Self::SmartCollection(id) => write!(f, "smart_collection_{id}"),
            Self::VirtualCollection(id) => write!(f, "virtual_collection_{id}"),
        }
    }
}

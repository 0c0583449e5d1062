//! Catalog entity types and the client-facing API trait.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// A supported game system as advertised by the catalog service.
///
/// Fields not promoted to typed columns survive in `extra` so the cached
/// payload round-trips losslessly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub id: i64,
    pub slug: String,
    pub fs_slug: String,
    pub name: String,
    #[serde(default)]
    pub custom_name: String,
    #[serde(default)]
    pub rom_count: i64,
    #[serde(default)]
    pub has_bios: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Platform {
    /// Name shown to users: the custom name when one is set.
    pub fn display_name(&self) -> &str {
        if self.custom_name.is_empty() {
            &self.name
        } else {
            &self.custom_name
        }
    }
}

/// One catalog item (a ROM).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub platform_id: i64,
    #[serde(default)]
    pub platform_fs_slug: String,
    pub name: String,
    #[serde(default)]
    pub fs_name: String,
    #[serde(default)]
    pub url_cover: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Game {
    /// The filesystem name with its extension stripped, used as the
    /// filename-index key.
    pub fn fs_name_no_ext(&self) -> &str {
        match self.fs_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => &self.fs_name,
        }
    }

    pub fn has_cover(&self) -> bool {
        self.url_cover.as_deref().is_some_and(|u| !u.is_empty())
    }
}

/// The identity scheme of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Regular,
    Smart,
    Virtual,
}

impl CollectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Smart => "smart",
            Self::Virtual => "virtual",
        }
    }

    pub fn from_str_loose(s: &str) -> Self {
        match s {
            "smart" => Self::Smart,
            "virtual" => Self::Virtual,
            _ => Self::Regular,
        }
    }
}

/// A named grouping of games, unified across the three identity schemes.
///
/// Regular and smart collections carry a numeric `remote_id`; virtual
/// collections carry a string `virtual_id` and no update timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub remote_id: Option<i64>,
    #[serde(default)]
    pub virtual_id: Option<String>,
    pub kind: CollectionKind,
    pub name: String,
    #[serde(default)]
    pub rom_count: i64,
    #[serde(default)]
    pub rom_ids: Vec<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Wire shape of regular and smart collections.
#[derive(Debug, Deserialize)]
pub(crate) struct WireCollection {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub rom_count: i64,
    #[serde(default)]
    pub rom_ids: Vec<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WireCollection {
    pub(crate) fn into_collection(self, kind: CollectionKind) -> Collection {
        Collection {
            remote_id: Some(self.id),
            virtual_id: None,
            kind,
            name: self.name,
            rom_count: self.rom_count,
            rom_ids: self.rom_ids,
            updated_at: self.updated_at,
            extra: self.extra,
        }
    }
}

/// Wire shape of virtual collections: string ids, no update timestamp the
/// cache can rely on.
#[derive(Debug, Deserialize)]
pub(crate) struct WireVirtualCollection {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub rom_count: i64,
    #[serde(default)]
    pub rom_ids: Vec<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WireVirtualCollection {
    pub(crate) fn into_collection(self) -> Collection {
        Collection {
            remote_id: None,
            virtual_id: Some(self.id),
            kind: CollectionKind::Virtual,
            name: self.name,
            rom_count: self.rom_count,
            rom_ids: self.rom_ids,
            updated_at: None,
            extra: self.extra,
        }
    }
}

/// A downloadable firmware file for a platform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Firmware {
    pub id: i64,
    pub file_name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A save-game record held by the remote service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSave {
    pub id: i64,
    pub rom_id: i64,
    pub file_name: String,
    #[serde(default)]
    pub file_name_no_ext: String,
    #[serde(default)]
    pub download_path: String,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One page of a paginated listing, with the service's declared total.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub total: i64,
}

/// A paginated game listing request. Exactly one listing scope is set.
#[derive(Debug, Clone, Default)]
pub struct GameQuery {
    pub platform_id: Option<i64>,
    pub collection_id: Option<i64>,
    pub smart_collection_id: Option<i64>,
    pub virtual_collection_id: Option<String>,
    pub offset: i64,
    pub limit: i64,
}

impl GameQuery {
    pub fn for_platform(platform_id: i64) -> Self {
        Self {
            platform_id: Some(platform_id),
            ..Self::default()
        }
    }

    /// Scope a query to a collection, dispatching on its identity scheme.
    pub fn for_collection(collection: &Collection) -> Self {
        let mut query = Self::default();
        match collection.kind {
            CollectionKind::Regular => query.collection_id = collection.remote_id,
            CollectionKind::Smart => query.smart_collection_id = collection.remote_id,
            CollectionKind::Virtual => {
                query.virtual_collection_id = collection.virtual_id.clone();
            }
        }
        query
    }

    pub fn page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// The fixed interface to the remote catalog service.
///
/// Plain async fns so tests can substitute an in-memory fake.
#[allow(async_fn_in_trait)]
pub trait CatalogApi {
    async fn platforms(&self) -> Result<Vec<Platform>, FetchError>;

    /// Paginated game listing for the query's scope.
    async fn games(&self, query: &GameQuery) -> Result<Page<Game>, FetchError>;

    async fn collections(&self) -> Result<Vec<Collection>, FetchError>;

    async fn smart_collections(&self) -> Result<Vec<Collection>, FetchError>;

    async fn virtual_collections(&self) -> Result<Vec<Collection>, FetchError>;

    async fn firmware(&self, platform_id: i64) -> Result<Vec<Firmware>, FetchError>;

    async fn saves(&self, rom_id: i64) -> Result<Vec<RemoteSave>, FetchError>;

    /// Fetch raw bytes from a service-relative path (artwork, media).
    async fn download(&self, path: &str) -> Result<Vec<u8>, FetchError>;

    async fn download_save(&self, save: &RemoteSave) -> Result<Vec<u8>, FetchError>;

    async fn upload_save(
        &self,
        rom_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), FetchError>;
}

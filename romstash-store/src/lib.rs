//! SQLite persistence layer for the catalog mirror.
//!
//! One database file holds platforms, games, collections, game↔collection
//! mappings, the filename lookup index, artwork metadata, firmware flags,
//! and generic key/value cache metadata. All multi-row replacements are
//! transactional so readers never observe a half-replaced set.

pub mod error;
pub mod schema;
pub mod store;

mod artwork;
mod collections;
mod games;
mod meta;
mod platforms;

pub use error::StoreError;
pub use meta::{META_ARTWORK_REFRESHED_AT, META_COLLECTIONS_REFRESHED_AT, META_GAMES_REFRESHED_AT};
pub use schema::SCHEMA_VERSION;
pub use store::{ArtworkEntry, StatsSnapshot, Store};

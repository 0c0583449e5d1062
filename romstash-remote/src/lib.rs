//! Remote catalog API for romstash.
//!
//! Defines the typed request/response shapes of the catalog service, the
//! [`CatalogApi`] trait consumed by the cache and sync layers, and a
//! reqwest-backed [`HttpCatalog`] implementation.

pub mod client;
pub mod error;
pub mod types;

pub use client::{Host, HttpCatalog};
pub use error::FetchError;
pub use types::{
    CatalogApi, Collection, CollectionKind, Firmware, Game, GameQuery, Page, Platform, RemoteSave,
};

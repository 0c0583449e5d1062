//! reqwest-backed implementation of [`CatalogApi`].

use tokio::time::Duration;

use crate::error::FetchError;
use crate::types::{
    CatalogApi, Collection, CollectionKind, Firmware, Game, GameQuery, Page, Platform, RemoteSave,
    WireCollection, WireVirtualCollection,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection target for a catalog service instance.
#[derive(Debug, Clone)]
pub struct Host {
    pub url: String,
    pub username: String,
    pub password: String,
}

impl Host {
    /// Base URL without a trailing slash.
    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

/// HTTP client for the catalog service.
pub struct HttpCatalog {
    http: reqwest::Client,
    host: Host,
}

impl HttpCatalog {
    pub fn new(host: Host, timeout: Option<Duration>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()?;
        Ok(Self { http, host })
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.host.base(), path))
            .basic_auth(&self.host.username, Some(&self.host.password))
    }

    /// Send a request and decode the JSON body, mapping auth and server
    /// failures before attempting the parse.
    async fn fetch_json<T: serde::de::DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, FetchError> {
        let resp = req.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::InvalidCredentials(
                "credentials rejected by the catalog service".to_string(),
            ));
        }
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            let snippet: String = text.chars().take(200).collect();
            FetchError::Api(format!("failed to parse {what}: {e}. Response: {snippet}"))
        })
    }

    fn game_params(query: &GameQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("offset", query.offset.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(id) = query.platform_id {
            params.push(("platform_id", id.to_string()));
        }
        if let Some(id) = query.collection_id {
            params.push(("collection_id", id.to_string()));
        }
        if let Some(id) = query.smart_collection_id {
            params.push(("smart_collection_id", id.to_string()));
        }
        if let Some(ref id) = query.virtual_collection_id {
            params.push(("virtual_collection_id", id.clone()));
        }
        params
    }
}

impl CatalogApi for HttpCatalog {
    async fn platforms(&self) -> Result<Vec<Platform>, FetchError> {
        self.fetch_json(self.get("/api/platforms"), "platform listing")
            .await
    }

    async fn games(&self, query: &GameQuery) -> Result<Page<Game>, FetchError> {
        let req = self.get("/api/roms").query(&Self::game_params(query));
        self.fetch_json(req, "game listing").await
    }

    async fn collections(&self) -> Result<Vec<Collection>, FetchError> {
        let wire: Vec<WireCollection> = self
            .fetch_json(self.get("/api/collections"), "collections")
            .await?;
        Ok(wire
            .into_iter()
            .map(|c| c.into_collection(CollectionKind::Regular))
            .collect())
    }

    async fn smart_collections(&self) -> Result<Vec<Collection>, FetchError> {
        let wire: Vec<WireCollection> = self
            .fetch_json(self.get("/api/collections/smart"), "smart collections")
            .await?;
        Ok(wire
            .into_iter()
            .map(|c| c.into_collection(CollectionKind::Smart))
            .collect())
    }

    async fn virtual_collections(&self) -> Result<Vec<Collection>, FetchError> {
        let req = self
            .get("/api/collections/virtual")
            .query(&[("type", "collection")]);
        let wire: Vec<WireVirtualCollection> =
            self.fetch_json(req, "virtual collections").await?;
        Ok(wire.into_iter().map(|c| c.into_collection()).collect())
    }

    async fn firmware(&self, platform_id: i64) -> Result<Vec<Firmware>, FetchError> {
        let req = self
            .get("/api/firmware")
            .query(&[("platform_id", platform_id.to_string())]);
        self.fetch_json(req, "firmware listing").await
    }

    async fn saves(&self, rom_id: i64) -> Result<Vec<RemoteSave>, FetchError> {
        let req = self
            .get("/api/saves")
            .query(&[("rom_id", rom_id.to_string())]);
        self.fetch_json(req, "save listing").await
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let resp = self.get(path).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                message: format!("download failed for {path}"),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn download_save(&self, save: &RemoteSave) -> Result<Vec<u8>, FetchError> {
        self.download(&save.download_path).await
    }

    async fn upload_save(
        &self,
        rom_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), FetchError> {
        let resp = self
            .http
            .post(format!("{}/api/saves", self.host.base()))
            .basic_auth(&self.host.username, Some(&self.host.password))
            .query(&[("rom_id", rom_id.to_string()), ("filename", file_name.to_string())])
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(FetchError::InvalidCredentials(
                "credentials rejected by the catalog service".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
                message: format!("save upload failed for rom {rom_id}"),
            });
        }
        log::debug!("Uploaded save {file_name} for rom {rom_id}");
        Ok(())
    }
}

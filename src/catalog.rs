// src/catalog.rs
use log::{debug, warn};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use crate::error::CatalogError;
use crate::models::api::{CrawlerResponse, CrawlerUpload, PageResponse, UploadSummary};
use crate::models::server::{Kind, ServerRecord};

const CRAWLER_USERNAME: &str = "crawler";

/// One page of the public listing.
#[derive(Debug)]
pub struct CatalogPage<R> {
    /// Rows the catalog returned, including any that failed to decode.
    pub rows: usize,
    pub servers: Vec<R>,
}

impl<R> CatalogPage<R> {
    /// The catalog answered with an empty `data` array.
    pub fn is_last(&self) -> bool {
        self.rows == 0
    }
}

/// HTTP client for the server-list catalog API.
pub struct CatalogClient {
    http: Client,
    base_url: String,
    secret_token: String,
}

impl CatalogClient {
    pub fn new(base_url: &str, secret_token: &str) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .user_agent(concat!("rsl-crawler/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_token: secret_token.to_string(),
        })
    }

    /// Fetches one page of the public listing.
    ///
    /// Rows that do not decode as `R` are dropped with a warning but still
    /// counted, so only a genuinely empty page ends the listing. A reply
    /// without `data` is an error.
    pub async fn fetch_page<R: ServerRecord>(&self, page: u32) -> Result<CatalogPage<R>, CatalogError> {
        let url = format!("{}/servers/{}/page/{}", self.base_url, R::KIND, page);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }

        let body: PageResponse = response.json().await?;
        if body.error != 0 {
            return Err(CatalogError::Api {
                code: body.error,
                info: body.info.unwrap_or_default(),
            });
        }

        let rows = body.data.ok_or(CatalogError::MissingData)?;
        let row_count = rows.len();
        let mut servers = Vec::with_capacity(row_count);
        for row in rows {
            match serde_json::from_value::<R>(row) {
                Ok(server) => servers.push(server),
                Err(e) => warn!("Skipping malformed {} server on page {}: {}", R::KIND, page, e),
            }
        }
        Ok(CatalogPage { rows: row_count, servers })
    }

    /// Pushes one batch of records to the crawler ingest endpoint.
    pub async fn upload<R: Serialize>(&self, kind: Kind, servers: &[R]) -> Result<UploadSummary, CatalogError> {
        let url = format!("{}/servers/{}/crawler", self.base_url, kind);
        debug!("Uploading {} {} servers", servers.len(), kind);

        let response = self.http
            .post(&url)
            .basic_auth(CRAWLER_USERNAME, Some(&self.secret_token))
            .json(&CrawlerUpload { servers })
            .send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::Status(response.status()));
        }

        let body: CrawlerResponse = response.json().await?;
        if body.error != 0 {
            return Err(CatalogError::Api {
                code: body.error,
                info: body.info.unwrap_or_default(),
            });
        }
        Ok(body.data.unwrap_or_default())
    }
}

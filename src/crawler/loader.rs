// src/crawler/loader.rs
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use crate::catalog::CatalogClient;
use crate::models::server::ServerRecord;
use crate::storage::memory::Registry;

/// Paged import of the public catalog listing into a registry.
pub struct Loader<R: ServerRecord> {
    catalog: Arc<CatalogClient>,
    registry: Arc<Registry<R>>,
    max_pages: u32,
    page_delay: Duration,
}

impl<R: ServerRecord> Loader<R> {
    pub fn new(
        catalog: Arc<CatalogClient>,
        registry: Arc<Registry<R>>,
        max_pages: u32,
        page_delay: Duration,
    ) -> Self {
        Self {
            catalog,
            registry,
            max_pages,
            page_delay,
        }
    }

    /// Walks pages `1..=max_pages` until the catalog returns an empty page.
    ///
    /// A failed page is skipped, not retried. A page whose rows all fail to
    /// decode is not the end of the listing. Returns the number of records
    /// written into the registry.
    pub async fn refresh(&self) -> usize {
        let mut loaded = 0;
        for page in 1..=self.max_pages {
            info!("Fetching {} servers (page {})", R::KIND, page);
            match self.catalog.fetch_page::<R>(page).await {
                Ok(page) if page.is_last() => break,
                Ok(page) => {
                    loaded += page.servers.len();
                    for server in page.servers {
                        self.registry.upsert(server);
                    }
                }
                Err(e) => warn!("Failed to fetch {} server page {}: {}", R::KIND, page, e),
            }

            tokio::time::sleep(self.page_delay).await;
        }

        info!("Loaded {} {} servers ({} tracked)", loaded, R::KIND, self.registry.len());
        if self.registry.is_empty() {
            warn!("No {} servers to crawl", R::KIND);
        }
        loaded
    }
}

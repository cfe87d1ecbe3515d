// src/crawler/uploader.rs
use log::{debug, info, warn};
use std::sync::Arc;
use crate::catalog::CatalogClient;
use crate::error::CatalogError;
use crate::models::server::ServerRecord;
use crate::storage::memory::{DirtySet, Registry};

/// Pushes dirty records back to the catalog in fixed-size batches.
pub struct Uploader<R: ServerRecord> {
    catalog: Arc<CatalogClient>,
    registry: Arc<Registry<R>>,
    dirty: Arc<DirtySet>,
    batch_size: usize,
}

impl<R: ServerRecord> Uploader<R> {
    pub fn new(
        catalog: Arc<CatalogClient>,
        registry: Arc<Registry<R>>,
        dirty: Arc<DirtySet>,
        batch_size: usize,
    ) -> Self {
        Self {
            catalog,
            registry,
            dirty,
            batch_size: batch_size.max(1),
        }
    }

    /// Runs one flush cycle and returns the number of records sent.
    ///
    /// The dirty set is only cleared once every batch of the cycle has been
    /// accepted; the first failing batch aborts the rest of the cycle and
    /// leaves all pending IDs for the next one.
    pub async fn flush(&self) -> Result<usize, CatalogError> {
        let pending = self.dirty.snapshot();
        if pending.is_empty() {
            return Ok(0);
        }

        let ids: Vec<u64> = pending.iter().map(|entry| entry.id).collect();
        let records = self.registry.snapshot(&ids);
        if records.len() != ids.len() {
            warn!(
                "{} of {} dirty {} servers are missing from the registry",
                ids.len() - records.len(),
                ids.len(),
                R::KIND
            );
        }

        let batches = records.chunks(self.batch_size);
        let batch_count = batches.len();
        for (index, batch) in batches.enumerate() {
            debug!("Uploading batch {} of {} for {} servers", index + 1, batch_count, R::KIND);
            let summary = match self.catalog.upload(R::KIND, batch).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!(
                        "Failed to upload {} servers (batch {} of {}): {}",
                        R::KIND,
                        index + 1,
                        batch_count,
                        e
                    );
                    return Err(e);
                }
            };

            info!("{} {} servers successfully updated.", summary.updated, R::KIND);
            if summary.updated < summary.total {
                warn!(
                    "Only {} {} servers have been updated successfully out of {}.",
                    summary.updated,
                    R::KIND,
                    summary.total
                );
            }
        }

        let cleared = self.dirty.clear_flushed(&pending);
        debug!("Cleared {} of {} flushed {} servers", cleared, pending.len(), R::KIND);
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::server::{fixtures, MinecraftServer};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn accepted(n: u64) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "error": 0,
            "info": "success",
            "data": { "updated": n, "total": n }
        }))
    }

    fn uploader_for(
        mock_server: &MockServer,
        ids: impl IntoIterator<Item = u64>,
    ) -> (Uploader<MinecraftServer>, Arc<Registry<MinecraftServer>>, Arc<DirtySet>) {
        let catalog = Arc::new(CatalogClient::new(&mock_server.uri(), "secret").unwrap());
        let registry = Arc::new(Registry::new());
        let dirty = Arc::new(DirtySet::new());
        for id in ids {
            registry.upsert(fixtures::minecraft(id, 0));
            dirty.mark(id);
        }
        (Uploader::new(catalog, registry.clone(), dirty.clone(), 20), registry, dirty)
    }

    async fn sent_batches(mock_server: &MockServer) -> Vec<serde_json::Value> {
        mock_server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| serde_json::from_slice(&request.body).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_empty_dirty_set_makes_no_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(accepted(0))
            .expect(0)
            .mount(&mock_server)
            .await;

        let (uploader, _, _) = uploader_for(&mock_server, []);
        assert_eq!(uploader.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_successful_flush_clears_dirty_set() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/servers/minecraft/crawler"))
            .respond_with(accepted(20))
            .expect(3)
            .mount(&mock_server)
            .await;

        let (uploader, _, dirty) = uploader_for(&mock_server, 1..=45);
        assert_eq!(uploader.flush().await.unwrap(), 45);
        assert!(dirty.is_empty());

        let batches = sent_batches(&mock_server).await;
        let sizes: Vec<usize> = batches
            .iter()
            .map(|body| body["servers"].as_array().unwrap().len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(batches[0]["servers"][0]["id"], json!(1));
        assert_eq!(batches[2]["servers"][4]["id"], json!(45));
    }

    #[tokio::test]
    async fn test_failed_batch_aborts_and_keeps_dirty_set() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(accepted(20))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let (uploader, _, dirty) = uploader_for(&mock_server, 1..=45);
        assert!(uploader.flush().await.is_err());

        assert_eq!(sent_batches(&mock_server).await.len(), 2);
        assert_eq!(dirty.len(), 45);
        assert!((1..=45).all(|id| dirty.contains(id)));
    }

    #[tokio::test]
    async fn test_application_error_aborts_flush() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 1001,
                "info": "Invalid crawler token"
            })))
            .mount(&mock_server)
            .await;

        let (uploader, _, dirty) = uploader_for(&mock_server, [1, 2]);
        let result = uploader.flush().await;
        assert!(matches!(result, Err(CatalogError::Api { code: 1001, .. })));
        assert_eq!(dirty.len(), 2);
    }

    #[tokio::test]
    async fn test_partial_acceptance_still_clears() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": 0,
                "info": "success",
                "data": { "updated": 1, "total": 2 }
            })))
            .mount(&mock_server)
            .await;

        let (uploader, _, dirty) = uploader_for(&mock_server, [1, 2]);
        assert_eq!(uploader.flush().await.unwrap(), 2);
        assert!(dirty.is_empty());
    }

    #[tokio::test]
    async fn test_retried_flush_sends_identical_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let (uploader, _, _) = uploader_for(&mock_server, [3, 1, 2]);
        assert!(uploader.flush().await.is_err());
        assert!(uploader.flush().await.is_err());

        let batches = sent_batches(&mock_server).await;
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], batches[1]);
    }

    #[tokio::test]
    async fn test_mutation_during_upload_stays_pending() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(accepted(1).set_delay(Duration::from_millis(300)))
            .mount(&mock_server)
            .await;

        let (uploader, registry, dirty) = uploader_for(&mock_server, [1]);
        let uploader = Arc::new(uploader);
        let flush = tokio::spawn({
            let uploader = uploader.clone();
            async move { uploader.flush().await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut probed = fixtures::minecraft(1, 10);
        probed.online = false;
        registry.apply_probe(&probed);
        dirty.mark(1);

        assert_eq!(flush.await.unwrap().unwrap(), 1);

        let batches = sent_batches(&mock_server).await;
        assert_eq!(batches[0]["servers"][0]["online"], json!(true));
        assert!(dirty.contains(1));
    }
}
